//! Property tests for correlation id allocation across call types.

use proptest::prelude::*;
use qc_index_client::adapters::memory::MemoryTransport;
use qc_index_client::adapters::raw::RawCodec;
use qc_index_client::domain::CorrelationCounter;
use qc_index_client::{ClientConfig, ConnectionSettings, CorrelationId, IndexClient};
use std::collections::HashSet;
use std::sync::Arc;

fn submit(client: &IndexClient<RawCodec>, kind: u8) -> Option<CorrelationId> {
    match kind % 6 {
        0 => client.blockchain_fetch_last_height(|_| {}),
        1 => client.blockchain_fetch_block_by_height(1, |_| {}),
        2 => client.blockchain_fetch_transaction(&[1; 32], |_| {}),
        3 => client.blockchain_fetch_history4(&[2; 20], 0, |_| {}),
        4 => client.transaction_pool_validate2(&bytes::Bytes::from_static(&[3]), |_| {}),
        _ => client.subscribe_address(&[4; 20], |_| {}),
    }
}

proptest! {
    #[test]
    fn ids_pairwise_distinct_across_call_types(kinds in prop::collection::vec(any::<u8>(), 1..128)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let transport = MemoryTransport::new();
            let settings = ConnectionSettings::new("inproc://props".parse().unwrap());
            transport.bind_service(&settings.server);
            let client = IndexClient::new(
                ClientConfig::for_testing(settings),
                Arc::new(transport),
                Arc::new(RawCodec),
            );
            client.connect_default().await.unwrap();

            let mut ids = HashSet::new();
            for kind in &kinds {
                let id = submit(&client, *kind).unwrap();
                prop_assert!(ids.insert(id), "id {} reused", id);
            }
            Ok(())
        })?;
    }

    #[test]
    fn counter_skips_ids_in_use(start in any::<u32>(), held in prop::collection::hash_set(any::<u32>(), 0..32)) {
        let mut counter = CorrelationCounter::starting_after(start);
        let in_use = |id: CorrelationId| held.contains(&id.get());
        let mut issued = HashSet::new();
        for _ in 0..64 {
            let id = counter.next(in_use);
            prop_assert!(!held.contains(&id.get()));
            prop_assert!(issued.insert(id));
        }
    }
}
