//! Property tests: sequential lock/unlock sequences against a simple model
//!
//! A path is held by at most one descriptor, every descriptor unlocks once,
//! and lock contents always reflect the current holder.

use std::collections::HashMap;

use arbor_topo::{LockContext, LockDescriptor, LockHandle, NodeStore, TopoError};
use proptest::prelude::*;

const PATHS: [&str; 3] = ["/a", "/a/b", "/c"];

#[derive(Debug, Clone)]
enum Op {
    TryLock(usize),
    Unlock(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..PATHS.len()).prop_map(Op::TryLock),
        (0..16_usize).prop_map(Op::Unlock),
    ]
}

fn model_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        max_shrink_iters: 256,
        ..ProptestConfig::default()
    }
}

fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async move {
        let store = NodeStore::default();
        store.create("global", "/a/b", "").unwrap();
        store.create("global", "/c", "").unwrap();
        let conn = store.connect("global").unwrap();
        let ctx = LockContext::new();

        let mut descriptors: Vec<LockDescriptor> = Vec::new();
        // path index -> index of the descriptor holding it
        let mut holders: HashMap<usize, usize> = HashMap::new();

        for op in ops {
            match op {
                Op::TryLock(p) => {
                    let contents = format!("holder-{}", descriptors.len());
                    let result = conn.try_lock(&ctx, PATHS[p], &contents).await;
                    if holders.contains_key(&p) {
                        prop_assert_eq!(
                            result.unwrap_err(),
                            TopoError::NodeExists(PATHS[p].to_string())
                        );
                    } else {
                        let ld = result.unwrap();
                        holders.insert(p, descriptors.len());
                        descriptors.push(ld);
                    }
                }
                Op::Unlock(i) => {
                    let Some(ld) = descriptors.get(i) else {
                        continue;
                    };
                    let p = PATHS.iter().position(|path| *path == ld.path()).unwrap();
                    let result = ld.unlock(&ctx).await;
                    if holders.get(&p) == Some(&i) {
                        prop_assert!(result.is_ok());
                        holders.remove(&p);
                    } else {
                        prop_assert_eq!(
                            result.unwrap_err(),
                            TopoError::NotLocked(PATHS[p].to_string())
                        );
                    }
                }
            }

            for (p, path) in PATHS.iter().enumerate() {
                let expected = holders
                    .get(&p)
                    .map(|&i| descriptors[i].contents().to_string());
                prop_assert_eq!(store.lock_contents("global", path).unwrap(), expected);
            }
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(model_config())]

    #[test]
    fn prop_sequential_locks_match_model(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        run(ops)?;
    }
}
