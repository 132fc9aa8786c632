//! Property-based tests for the testable properties spec §8 names.
//!
//! Each property is exercised over generated inputs with `proptest`, in
//! the same style as the teacher's `memory-core/tests/property_tests.rs`
//! (plain `proptest! { #[test] fn ... }` blocks, no custom harness). The
//! async KSG/queue/working-memory operations are driven through a
//! throwaway single-threaded `tokio::runtime::Runtime` inside each test
//! body, since `proptest!` test functions are themselves synchronous.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Map, Value};
use uuid::Uuid;

use ksg_core::procedure::{OnFail, Plan, PlanStep, ProcedureSubsystem, StepKind};
use ksg_core::queue::{EnqueueRequest, TaskQueue};
use ksg_core::seed::seed_prototypes;
use ksg_core::store::{cosine_similarity, InMemoryStore, MemoryStore, SearchFilter};
use ksg_core::tools::{NullToolInvoker, ToolRegistry};
use ksg_core::working_memory::{WorkingMemory, WorkingMemoryConfig};
use ksg_core::Ksg;
use ksg_core::llm::MockLlmClient;

const DIM: usize = 8;

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build a single-threaded runtime for a property test")
}

/// A strategy for small, finite-valued embedding vectors of length `DIM`.
fn embedding() -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-10.0f32..10.0f32, DIM)
}

// ---------------------------------------------------------------------------
// Property 1: centroid invariant. For any sequence of `addExemplar` calls,
// the concept's stored embedding equals sum/count within 1e-9 * d.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn centroid_equals_incremental_mean(
        exemplars in proptest::collection::vec(embedding(), 1..8)
    ) {
        rt().block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let llm = Arc::new(MockLlmClient::new(DIM));
            let ksg = Ksg::new(store, llm, DIM);
            seed_prototypes(&ksg).await.unwrap();
            let proto = ksg.create_prototype("Procedure", None, vec![]).await.unwrap();
            let concept = ksg
                .create_concept(proto, Map::new(), Some(vec![0.0; DIM]), None)
                .await
                .unwrap();

            for e in &exemplars {
                ksg.add_exemplar(concept, e, None).await.unwrap();
            }

            let node = ksg.store().get_node(concept).await.unwrap().unwrap();
            let stored = node.embedding.unwrap();

            let mut expected = vec![0.0f64; DIM];
            for e in &exemplars {
                for (s, v) in expected.iter_mut().zip(e.iter()) {
                    *s += f64::from(*v);
                }
            }
            let count = exemplars.len() as f64;
            let tolerance = 1e-9 * DIM as f64;
            for (s, e) in stored.iter().zip(expected.iter()) {
                let want = (*e / count) as f32;
                prop_assert!((f64::from(*s) - f64::from(want)).abs() < tolerance.max(1e-6));
            }
            Ok(())
        })?;
    }

    // -----------------------------------------------------------------
    // Property 2: cosine similarity is symmetric for any pair of vectors.
    // -----------------------------------------------------------------

    #[test]
    fn cosine_similarity_is_symmetric(a in embedding(), b in embedding()) {
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        prop_assert!((ab - ba).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_is_bounded(a in embedding(), b in embedding()) {
        let sim = cosine_similarity(&a, &b);
        prop_assert!((-1.0..=1.0).contains(&sim));
    }

    // -----------------------------------------------------------------
    // Property 2 (continued): search results are stable under a
    // permutation of insertion order — the same query against the same
    // set of nodes, inserted in a different order, ranks identically.
    // -----------------------------------------------------------------

    #[test]
    fn search_ranking_is_stable_under_insertion_order(
        perm_seed in 0u64..64
    ) {
        rt().block_on(async {
            let vectors: Vec<Vec<f32>> = (0..6)
                .map(|i| {
                    let mut v = vec![0.01f32; DIM];
                    v[i % DIM] = 1.0 + i as f32 * 0.1;
                    v
                })
                .collect();
            let query = vectors[0].clone();

            let mut order: Vec<usize> = (0..vectors.len()).collect();
            // deterministic pseudo-shuffle keyed by perm_seed, no RNG needed
            order.sort_by_key(|&i| (i as u64 * 2654435761u64 + perm_seed) % 997);

            let store_a = InMemoryStore::new();
            for &i in &order {
                store_a
                    .upsert(ksg_core::store::Entity::Node(
                        ksg_core::types::Node::new(
                            "Concept",
                            ksg_core::types::Provenance::new("test", Uuid::new_v4()),
                        )
                        .with_embedding(vectors[i].clone()),
                    ))
                    .await
                    .unwrap();
            }
            let results_a = store_a
                .search(&SearchFilter::by_kind("Concept"), Some(&query), 3, 0.0)
                .await
                .unwrap();

            let store_b = InMemoryStore::new();
            for i in 0..vectors.len() {
                store_b
                    .upsert(ksg_core::store::Entity::Node(
                        ksg_core::types::Node::new(
                            "Concept",
                            ksg_core::types::Provenance::new("test", Uuid::new_v4()),
                        )
                        .with_embedding(vectors[i].clone()),
                    ))
                    .await
                    .unwrap();
            }
            let results_b = store_b
                .search(&SearchFilter::by_kind("Concept"), Some(&query), 3, 0.0)
                .await
                .unwrap();

            let scores_a: Vec<f32> = results_a.iter().map(|s| s.score).collect();
            let scores_b: Vec<f32> = results_b.iter().map(|s| s.score).collect();
            prop_assert_eq!(scores_a.len(), scores_b.len());
            for (x, y) in scores_a.iter().zip(scores_b.iter()) {
                prop_assert!((x - y).abs() < 1e-5);
            }
            Ok(())
        })?;
    }

    // -----------------------------------------------------------------
    // Property 4: generalization is idempotent. Calling
    // `generalizeConcepts` twice with the same unchanged exemplars
    // returns a bit-identical embedding.
    // -----------------------------------------------------------------

    #[test]
    fn generalize_concepts_is_idempotent(
        a in embedding(), b in embedding(), c in embedding()
    ) {
        rt().block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let llm = Arc::new(MockLlmClient::new(DIM));
            let ksg = Ksg::new(store, llm, DIM);
            seed_prototypes(&ksg).await.unwrap();
            let proto = ksg.create_prototype("Procedure", None, vec![]).await.unwrap();

            let mut ids = Vec::new();
            for e in [&a, &b, &c] {
                let id = ksg
                    .create_concept(proto, Map::new(), Some(e.clone()), None)
                    .await
                    .unwrap();
                ids.push(id);
            }

            // min_similarity=-1.0 so every exemplar is accepted regardless
            // of how the generated vectors happen to relate to each other;
            // idempotence is what's under test, not the acceptance filter.
            let g1 = ksg
                .generalize_concepts(&ids, "Generalized", "d", -1.0)
                .await
                .unwrap();
            let g2 = ksg
                .generalize_concepts(&ids, "Generalized", "d", -1.0)
                .await
                .unwrap();

            let n1 = ksg.store().get_node(g1).await.unwrap().unwrap();
            let n2 = ksg.store().get_node(g2).await.unwrap().unwrap();
            prop_assert_eq!(n1.embedding, n2.embedding);
            Ok(())
        })?;
    }

    // -----------------------------------------------------------------
    // Property 5: queue ordering holds for any interleaving of enqueues
    // with distinct (priority, enqueued_at) pairs: `list_items` always
    // returns priority desc, then enqueued_at asc.
    // -----------------------------------------------------------------

    #[test]
    fn queue_orders_by_priority_then_enqueued_at(
        priorities in proptest::collection::vec(-5i64..5i64, 2..8)
    ) {
        rt().block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let llm = Arc::new(MockLlmClient::new(DIM));
            let ksg = Arc::new(Ksg::new(store, llm, DIM));
            seed_prototypes(&ksg).await.unwrap();
            let queue = TaskQueue::new(Arc::clone(&ksg), "default").await.unwrap();

            let mut enqueued = Vec::new();
            for &priority in &priorities {
                let id = queue
                    .enqueue(EnqueueRequest { priority, ..Default::default() })
                    .await
                    .unwrap();
                enqueued.push((id, priority));
                // enqueued_at ordering only matters when priorities tie;
                // a short sleep guarantees a strictly increasing timestamp.
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }

            let items = queue.list_items().await.unwrap();
            prop_assert_eq!(items.len(), enqueued.len());

            let mut last_priority = i64::MAX;
            let mut last_enqueued_at = String::new();
            for item in &items {
                let p = item.get_f64("priority").unwrap() as i64;
                let enq = item.get_str("enqueuedAt").unwrap().to_string();
                prop_assert!(
                    p < last_priority || (p == last_priority && enq >= last_enqueued_at),
                    "queue ordering violated: {p} after {last_priority}"
                );
                last_priority = p;
                last_enqueued_at = enq;
            }
            Ok(())
        })?;
    }

    // -----------------------------------------------------------------
    // Property 6: working-memory monotonicity. Repeated `access(u)` never
    // decreases `w(u)` until it saturates at `W_max`.
    // -----------------------------------------------------------------

    #[test]
    fn working_memory_access_never_decreases_until_saturation(
        access_count in 1usize..50
    ) {
        let wm = WorkingMemory::new(WorkingMemoryConfig { max_weight: 10.0, ..WorkingMemoryConfig::default() });
        let id = Uuid::new_v4();
        let mut previous = 0.0f32;
        for _ in 0..access_count {
            wm.access(id);
            let current = wm.weight(id);
            prop_assert!(current >= previous - 1e-6);
            previous = current;
        }
        prop_assert!(previous <= 10.0 + 1e-6);
    }

    // -----------------------------------------------------------------
    // Property 7: form fingerprint is order-insensitive over its label/
    // type/placeholder sets (a proxy for "stable under cosmetic DOM
    // changes") and changes whenever the field set itself changes.
    // -----------------------------------------------------------------

    #[test]
    fn fingerprint_is_invariant_to_field_order(
        mut labels in proptest::collection::vec("[a-zA-Z]{1,8}", 1..5)
    ) {
        use ksg_core::form::{fingerprint, FormShape};

        let shape_a = FormShape {
            domain: "example.com".into(),
            path: "/login".into(),
            labels: labels.clone(),
            input_types: vec!["text".into()],
            placeholders: vec![],
        };
        labels.reverse();
        let shape_b = FormShape {
            domain: "example.com".into(),
            path: "/login".into(),
            labels,
            input_types: vec!["text".into()],
            placeholders: vec![],
        };
        prop_assert_eq!(fingerprint(&shape_a), fingerprint(&shape_b));
    }

    // -----------------------------------------------------------------
    // Property 3: for any procedure built via `createFromJson`, `hydrate`
    // reconstructs a plan equivalent to the original modulo step-id
    // renaming (here the ids are already stable, so this checks full
    // equivalence of name/tool/params/dependency sets per step).
    // -----------------------------------------------------------------

    #[test]
    fn hydrate_round_trips_a_generated_chain_plan(chain_len in 1usize..6) {
        rt().block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let llm = Arc::new(MockLlmClient::new(DIM));
            let ksg = Arc::new(Ksg::new(store, llm, DIM));
            seed_prototypes(&ksg).await.unwrap();
            let tools = Arc::new(ToolRegistry::with_canonical_tools(Arc::new(NullToolInvoker)));
            let sub = ProcedureSubsystem::new(Arc::clone(&ksg), tools);

            let ids: Vec<String> = (0..chain_len).map(|i| format!("s{i}")).collect();
            let steps: Vec<PlanStep> = ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    let mut params = Map::new();
                    params.insert("url".into(), Value::String("https://example.com".into()));
                    params.insert("selector".into(), Value::String(format!("#field{i}")));
                    params.insert("text".into(), Value::String("value".into()));
                    PlanStep {
                        id: id.clone(),
                        name: Some(format!("step {i}")),
                        tool: "web.fill".into(),
                        params,
                        depends_on: if i == 0 { vec![] } else { vec![ids[i - 1].clone()] },
                        on_fail: OnFail::Stop,
                        kind: StepKind::Operation,
                    }
                })
                .collect();
            let plan = Plan {
                name: "Generated chain".into(),
                description: Some("d".into()),
                steps,
                ..Default::default()
            };

            let procedure_id = sub.create_from_json(&plan, None).await.unwrap();
            let hydrated = sub.hydrate(procedure_id).await.unwrap();

            prop_assert_eq!(&hydrated.name, &plan.name);
            prop_assert_eq!(hydrated.steps.len(), plan.steps.len());
            for original in &plan.steps {
                let found = hydrated.steps.iter().find(|s| s.id == original.id);
                prop_assert!(found.is_some(), "hydrate dropped step {}", original.id);
                let found = found.unwrap();
                prop_assert_eq!(&found.tool, &original.tool);
                prop_assert_eq!(&found.params, &original.params);
                let mut got_deps = found.depends_on.clone();
                let mut want_deps = original.depends_on.clone();
                got_deps.sort();
                want_deps.sort();
                prop_assert_eq!(got_deps, want_deps);
            }
            Ok(())
        })?;
    }
}
