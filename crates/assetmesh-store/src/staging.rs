//! The staging buffer: one bounded, preallocated slot for an in-flight upload.
//!
//! The buffer is allocated once when the store is built and leased to a single
//! filter id at a time. A lease lives from the first chunk until the upload is
//! committed, removed, found out of sequence, or times out.

use assetmesh_core::{AssetFilter, CoreError, Crc16Digest, FilterId};

use crate::error::SequenceFault;

/// Validation outcome of a staged upload.
#[derive(Debug, Clone)]
pub enum StagedState {
    /// Still receiving chunks.
    Receiving,
    /// All bytes received and the blob is a valid filter.
    Ready(AssetFilter),
    /// All bytes received but the blob is not a valid filter.
    Invalid(CoreError),
}

/// Progress after accepting a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkProgress {
    Partial { received: usize, total: usize },
    Complete { crc: u16 },
}

#[derive(Debug)]
struct Lease {
    filter_id: FilterId,
    total_size: usize,
    received: usize,
    digest: Crc16Digest,
    crc: Option<u16>,
    state: StagedState,
}

/// A single preallocated upload buffer.
#[derive(Debug)]
pub struct StagingBuffer {
    buf: Box<[u8]>,
    lease: Option<Lease>,
}

impl StagingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            lease: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The filter id currently holding the buffer.
    pub fn in_flight(&self) -> Option<FilterId> {
        self.lease.as_ref().map(|lease| lease.filter_id)
    }

    pub fn state(&self) -> Option<&StagedState> {
        self.lease.as_ref().map(|lease| &lease.state)
    }

    pub fn received(&self) -> usize {
        self.lease.as_ref().map_or(0, |lease| lease.received)
    }

    /// Lease the buffer to `filter_id`. The caller has checked capacity and
    /// that no lease is held.
    pub fn begin(&mut self, filter_id: FilterId, total_size: usize) {
        debug_assert!(self.lease.is_none());
        debug_assert!(total_size <= self.capacity());
        self.lease = Some(Lease {
            filter_id,
            total_size,
            received: 0,
            digest: Crc16Digest::new(),
            crc: None,
            state: StagedState::Receiving,
        });
    }

    /// Append a chunk to the held lease.
    ///
    /// On a fault the lease is released; the caller reports the error.
    pub fn append(
        &mut self,
        chunk_start: usize,
        total_size: usize,
        data: &[u8],
    ) -> Result<ChunkProgress, SequenceFault> {
        let lease = match self.lease.as_mut() {
            Some(lease) => lease,
            None => {
                return Err(SequenceFault::UnexpectedOffset {
                    expected: 0,
                    got: chunk_start,
                })
            }
        };

        let end = chunk_start + data.len();
        let fault = if total_size != lease.total_size {
            Some(SequenceFault::TotalSizeChanged {
                expected: lease.total_size,
                got: total_size,
            })
        } else if chunk_start != lease.received {
            Some(SequenceFault::UnexpectedOffset {
                expected: lease.received,
                got: chunk_start,
            })
        } else if end > lease.total_size {
            Some(SequenceFault::Overflow {
                end,
                total: lease.total_size,
            })
        } else {
            None
        };
        if let Some(fault) = fault {
            self.lease = None;
            return Err(fault);
        }

        self.buf[chunk_start..end].copy_from_slice(data);
        lease.received = end;

        if let Some(crc) = lease.crc {
            return Ok(ChunkProgress::Complete { crc });
        }
        lease.digest.update(data);
        if lease.received < lease.total_size {
            return Ok(ChunkProgress::Partial {
                received: lease.received,
                total: lease.total_size,
            });
        }

        let crc = std::mem::take(&mut lease.digest).finalize();
        lease.crc = Some(crc);
        Ok(ChunkProgress::Complete { crc })
    }

    /// The bytes of a fully received upload.
    pub fn contents(&self) -> &[u8] {
        match &self.lease {
            Some(lease) => &self.buf[..lease.received],
            None => &[],
        }
    }

    /// Record the validation outcome of a completed upload.
    pub fn set_state(&mut self, state: StagedState) {
        if let Some(lease) = self.lease.as_mut() {
            lease.state = state;
        }
    }

    /// Release the lease, returning its id and final state.
    pub fn take(&mut self) -> Option<(FilterId, StagedState)> {
        self.lease.take().map(|lease| (lease.filter_id, lease.state))
    }

    /// Release the lease, discarding it.
    pub fn discard(&mut self) -> Option<FilterId> {
        self.take().map(|(id, _)| id)
    }
}
