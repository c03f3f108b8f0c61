//! Control-channel command codec.
//!
//! Every payload starts with a protocol byte. Integers are little-endian.
//!
//! ```text
//! Upload        protocol | filter_id u8 | chunk_start u16 | total_size u16 | chunk_size u16 | chunk
//! Remove        protocol | filter_id u8
//! Commit        protocol | master_version u16 | master_crc u16
//! GetSummaries  protocol
//! ```
//!
//! Replies produced by [`handle_command`]:
//!
//! ```text
//! Upload        protocol | status u8 (0 receiving, 1 complete) | received u16 or crc u16
//! Remove        protocol | outcome u8 (0 no change, 1 scheduled, 2 staging discarded)
//! Commit        protocol | master_version u16 | master_crc u16
//! GetSummaries  protocol | master_version u16 | master_crc u16 | staging_capacity u16 | (filter_id u8 | crc u16)*
//! ```

use assetmesh_core::{FilterId, FilterSummary, MasterSummary};

use crate::error::{Result, StoreError};
use crate::store::{AssetFilterStore, FilterSummaries, RemoveOutcome, UploadProgress};
use crate::traits::FilterStorage;

/// Control-channel protocol version.
pub const COMMAND_PROTOCOL_VERSION: u8 = 1;

/// Command discriminator, carried out of band by the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    Upload = 0,
    Remove = 1,
    Commit = 2,
    GetSummaries = 3,
}

impl CommandKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Upload),
            1 => Ok(Self::Remove),
            2 => Ok(Self::Commit),
            3 => Ok(Self::GetSummaries),
            other => Err(StoreError::MalformedCommand(format!(
                "unknown command kind {}",
                other
            ))),
        }
    }
}

/// A decoded control command. Upload data borrows from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCommand<'a> {
    Upload {
        filter_id: FilterId,
        chunk_start: u16,
        total_size: u16,
        chunk_size: u16,
        data: &'a [u8],
    },
    Remove {
        filter_id: FilterId,
    },
    Commit {
        master_version: u16,
        master_crc: u16,
    },
    GetSummaries,
}

impl<'a> FilterCommand<'a> {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Upload { .. } => CommandKind::Upload,
            Self::Remove { .. } => CommandKind::Remove,
            Self::Commit { .. } => CommandKind::Commit,
            Self::GetSummaries => CommandKind::GetSummaries,
        }
    }

    pub fn decode(kind: CommandKind, payload: &'a [u8]) -> Result<Self> {
        let mut r = Reader::new(payload);
        let protocol = r.u8()?;
        if protocol != COMMAND_PROTOCOL_VERSION {
            return Err(StoreError::UnsupportedProtocol(protocol));
        }

        let command = match kind {
            CommandKind::Upload => {
                let filter_id = FilterId(r.u8()?);
                let chunk_start = r.u16()?;
                let total_size = r.u16()?;
                let chunk_size = r.u16()?;
                let data = r.take(chunk_size as usize)?;
                Self::Upload {
                    filter_id,
                    chunk_start,
                    total_size,
                    chunk_size,
                    data,
                }
            }
            CommandKind::Remove => Self::Remove {
                filter_id: FilterId(r.u8()?),
            },
            CommandKind::Commit => Self::Commit {
                master_version: r.u16()?,
                master_crc: r.u16()?,
            },
            CommandKind::GetSummaries => Self::GetSummaries,
        };
        r.finish()?;
        Ok(command)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![COMMAND_PROTOCOL_VERSION];
        match self {
            Self::Upload {
                filter_id,
                chunk_start,
                total_size,
                chunk_size,
                data,
            } => {
                out.push(filter_id.get());
                out.extend_from_slice(&chunk_start.to_le_bytes());
                out.extend_from_slice(&total_size.to_le_bytes());
                out.extend_from_slice(&chunk_size.to_le_bytes());
                out.extend_from_slice(data);
            }
            Self::Remove { filter_id } => out.push(filter_id.get()),
            Self::Commit {
                master_version,
                master_crc,
            } => {
                out.extend_from_slice(&master_version.to_le_bytes());
                out.extend_from_slice(&master_crc.to_le_bytes());
            }
            Self::GetSummaries => {}
        }
        out
    }
}

/// Encode a summaries reply.
pub fn encode_summaries(summaries: &FilterSummaries) -> Vec<u8> {
    let mut out = Vec::with_capacity(7 + 3 * summaries.filters.len());
    out.push(COMMAND_PROTOCOL_VERSION);
    out.extend_from_slice(&summaries.master.version.to_le_bytes());
    out.extend_from_slice(&summaries.master.crc.to_le_bytes());
    let capacity = u16::try_from(summaries.staging_capacity).unwrap_or(u16::MAX);
    out.extend_from_slice(&capacity.to_le_bytes());
    for summary in &summaries.filters {
        out.push(summary.filter_id.get());
        out.extend_from_slice(&summary.crc.to_le_bytes());
    }
    out
}

/// Decode a summaries reply.
pub fn decode_summaries(bytes: &[u8]) -> Result<FilterSummaries> {
    let mut r = Reader::new(bytes);
    let protocol = r.u8()?;
    if protocol != COMMAND_PROTOCOL_VERSION {
        return Err(StoreError::UnsupportedProtocol(protocol));
    }
    let master = MasterSummary::new(r.u16()?, r.u16()?);
    let staging_capacity = r.u16()? as usize;

    let mut filters = Vec::new();
    while !r.is_empty() {
        filters.push(FilterSummary {
            filter_id: FilterId(r.u8()?),
            crc: r.u16()?,
        });
    }
    Ok(FilterSummaries {
        master,
        staging_capacity,
        filters,
    })
}

/// Decode and execute a command, returning the encoded reply.
pub fn handle_command<S: FilterStorage>(
    store: &mut AssetFilterStore<S>,
    kind: CommandKind,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let mut reply = vec![COMMAND_PROTOCOL_VERSION];
    match FilterCommand::decode(kind, payload)? {
        FilterCommand::Upload {
            filter_id,
            chunk_start,
            total_size,
            chunk_size,
            data,
        } => match store.upload(filter_id, total_size, chunk_size, chunk_start, data)? {
            UploadProgress::Receiving { received, .. } => {
                reply.push(0);
                reply.extend_from_slice(&(received as u16).to_le_bytes());
            }
            UploadProgress::Complete { crc } => {
                reply.push(1);
                reply.extend_from_slice(&crc.to_le_bytes());
            }
        },
        FilterCommand::Remove { filter_id } => {
            reply.push(match store.remove(filter_id)? {
                RemoveOutcome::NoChange => 0,
                RemoveOutcome::Scheduled => 1,
                RemoveOutcome::StagingDiscarded => 2,
            });
        }
        FilterCommand::Commit {
            master_version,
            master_crc,
        } => {
            let report = store.commit(master_version, master_crc)?;
            reply.extend_from_slice(&report.master.version.to_le_bytes());
            reply.extend_from_slice(&report.master.crc.to_le_bytes());
        }
        FilterCommand::GetSummaries => return Ok(encode_summaries(&store.get_summaries())),
    }
    Ok(reply)
}

/// Little-endian cursor over a command payload.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(StoreError::MalformedCommand(format!(
                "payload truncated: needed {} bytes, have {}",
                end,
                self.bytes.len()
            )));
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(StoreError::MalformedCommand(format!(
                "{} trailing bytes",
                self.bytes.len() - self.pos
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::store::StoreConfig;

    #[test]
    fn test_decode_upload() {
        let payload = [1, 3, 50, 0, 100, 0, 2, 0, 0xAA, 0xBB];
        let cmd = FilterCommand::decode(CommandKind::Upload, &payload).unwrap();
        assert_eq!(
            cmd,
            FilterCommand::Upload {
                filter_id: FilterId(3),
                chunk_start: 50,
                total_size: 100,
                chunk_size: 2,
                data: &[0xAA, 0xBB],
            }
        );
        assert_eq!(cmd.encode(), payload.to_vec());
    }

    #[test]
    fn test_decode_commit_little_endian() {
        let cmd = FilterCommand::decode(CommandKind::Commit, &[1, 0x02, 0x01, 0xCD, 0xAB]).unwrap();
        assert_eq!(
            cmd,
            FilterCommand::Commit {
                master_version: 0x0102,
                master_crc: 0xABCD
            }
        );
    }

    #[test]
    fn test_unknown_protocol() {
        let err = FilterCommand::decode(CommandKind::GetSummaries, &[2]).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedProtocol(2)));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let err = FilterCommand::decode(CommandKind::Upload, &[1, 3, 0, 0, 4, 0, 4, 0, 1]).unwrap_err();
        assert!(matches!(err, StoreError::MalformedCommand(_)));

        let err = FilterCommand::decode(CommandKind::Remove, &[1, 3, 9]).unwrap_err();
        assert!(matches!(err, StoreError::MalformedCommand(_)));

        assert!(CommandKind::from_u8(4).is_err());
    }

    #[test]
    fn test_summaries_codec() {
        let summaries = FilterSummaries {
            master: MasterSummary::new(7, 0x1234),
            staging_capacity: 512,
            filters: vec![
                FilterSummary { filter_id: FilterId(1), crc: 0xAAAA },
                FilterSummary { filter_id: FilterId(4), crc: 0x0102 },
            ],
        };
        let bytes = encode_summaries(&summaries);
        assert_eq!(&bytes[..7], &[1, 7, 0, 0x34, 0x12, 0x00, 0x02]);
        assert_eq!(decode_summaries(&bytes).unwrap(), summaries);
    }

    #[test]
    fn test_handle_get_summaries_on_empty_store() {
        let mut store = AssetFilterStore::open(MemoryStorage::new(), StoreConfig::default()).unwrap();
        let reply = handle_command(&mut store, CommandKind::GetSummaries, &[1]).unwrap();
        let summaries = decode_summaries(&reply).unwrap();
        assert_eq!(summaries.master.version, 0);
        assert_eq!(summaries.staging_capacity, 512);
        assert!(summaries.filters.is_empty());
    }

    #[test]
    fn test_handle_remove_unknown() {
        let mut store = AssetFilterStore::open(MemoryStorage::new(), StoreConfig::default()).unwrap();
        let reply = handle_command(&mut store, CommandKind::Remove, &[1, 9]).unwrap();
        assert_eq!(reply, vec![1, 0]);
    }

    #[test]
    fn test_handle_upload_reports_progress() {
        let mut store = AssetFilterStore::open(MemoryStorage::new(), StoreConfig::default()).unwrap();
        let cmd = FilterCommand::Upload {
            filter_id: FilterId(2),
            chunk_start: 0,
            total_size: 40,
            chunk_size: 3,
            data: &[0, 0, 0],
        };
        let reply = handle_command(&mut store, CommandKind::Upload, &cmd.encode()).unwrap();
        assert_eq!(reply, vec![1, 0, 3, 0]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn kind() -> impl Strategy<Value = CommandKind> {
            prop_oneof![
                Just(CommandKind::Upload),
                Just(CommandKind::Remove),
                Just(CommandKind::Commit),
                Just(CommandKind::GetSummaries),
            ]
        }

        proptest! {
            #[test]
            fn decoded_commands_reencode_exactly(
                kind in kind(),
                payload in prop::collection::vec(any::<u8>(), 0..40),
            ) {
                if let Ok(cmd) = FilterCommand::decode(kind, &payload) {
                    prop_assert_eq!(cmd.kind(), kind);
                    prop_assert_eq!(cmd.encode(), payload);
                }
            }

            #[test]
            fn summaries_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..40)) {
                let _ = decode_summaries(&bytes);
            }
        }
    }
}
