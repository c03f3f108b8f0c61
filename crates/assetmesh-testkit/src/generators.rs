//! Proptest generators for property-based testing.

use proptest::prelude::*;

use assetmesh_core::{
    FilterId, InputType, MacAddress, MasterSummary, MAX_AD_PAYLOAD_LEN,
};

/// Generate a FilterId.
pub fn filter_id() -> impl Strategy<Value = FilterId> {
    any::<u8>().prop_map(FilterId)
}

/// Generate a MAC address.
pub fn mac_address() -> impl Strategy<Value = MacAddress> {
    any::<[u8; 6]>().prop_map(MacAddress)
}

/// Generate a non-zero (configured) master version.
pub fn master_version() -> impl Strategy<Value = u16> {
    1u16..=u16::MAX
}

/// Generate a master summary, possibly unconfigured.
pub fn master_summary() -> impl Strategy<Value = MasterSummary> {
    (any::<u16>(), any::<u16>()).prop_map(|(v, c)| MasterSummary::new(v, c))
}

/// Generate an AD payload that fits a legacy advertisement.
pub fn ad_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=MAX_AD_PAYLOAD_LEN)
}

/// Generate `count` distinct keys of `len` bytes.
pub fn distinct_keys(len: usize, count: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(prop::collection::vec(any::<u8>(), len), count)
        .prop_map(|set| set.into_iter().collect())
}

/// Generate any input type.
pub fn input_type() -> impl Strategy<Value = InputType> {
    prop_oneof![
        Just(InputType::MacAddress),
        any::<u8>().prop_map(|ad_type| InputType::AdDataType { ad_type }),
        (any::<u8>(), any::<u32>())
            .prop_map(|(ad_type, mask)| InputType::MaskedAdDataType { ad_type, mask }),
    ]
}

/// Generate raw advertisement data made of well-formed AD structures.
pub fn advertisement_data() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec((1u8..=0xFF, prop::collection::vec(any::<u8>(), 0..=8)), 0..=4)
        .prop_map(|records| {
            let mut out = Vec::new();
            for (ad_type, payload) in records {
                out.push(payload.len() as u8 + 1);
                out.push(ad_type);
                out.extend_from_slice(&payload);
            }
            out
        })
}

/// Parameters for an exact-match filter.
#[derive(Debug, Clone)]
pub struct ExactMatchParams {
    pub item_size: u8,
    pub items: Vec<Vec<u8>>,
}

impl Arbitrary for ExactMatchParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (1u8..=8, 0usize..=32)
            .prop_flat_map(|(item_size, count)| {
                distinct_keys(item_size as usize, count)
                    .prop_map(move |items| ExactMatchParams { item_size, items })
            })
            .boxed()
    }
}

/// A sequence of chunk lengths that covers `total` bytes exactly.
pub fn chunk_plan(total: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=64, 1..=total.max(1)).prop_map(move |lens| {
        let mut plan = Vec::new();
        let mut covered = 0;
        for len in lens {
            if covered >= total {
                break;
            }
            let len = len.min(total - covered);
            plan.push(len);
            covered += len;
        }
        if covered < total {
            plan.push(total - covered);
        }
        plan
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetmesh_core::AdStructures;

    proptest! {
        #[test]
        fn chunk_plan_covers_total(plan in (1usize..=400).prop_flat_map(|t| (Just(t), chunk_plan(t)))) {
            let (total, lens) = plan;
            prop_assert_eq!(lens.iter().sum::<usize>(), total);
            prop_assert!(lens.iter().all(|&l| l > 0));
        }

        #[test]
        fn advertisement_data_is_well_formed(data in advertisement_data()) {
            let consumed: usize = AdStructures::new(&data).map(|ad| ad.payload.len() + 2).sum();
            prop_assert_eq!(consumed, data.len());
        }

        #[test]
        fn exact_match_params_are_distinct(params: ExactMatchParams) {
            let mut sorted = params.items.clone();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), params.items.len());
            prop_assert!(params.items.iter().all(|i| i.len() == params.item_size as usize));
        }
    }
}
