use spectree_common::{Spec, Suite, SuiteAddress};
use spectree_e2e::specs;
use test_case::test_case;

/// Depth-first traversal yields a topic's own tests before descending into
/// its subtopics, so `t3` runs before the nested `t2`.
#[test]
fn nested_tree_runs_in_depth_first_declaration_order() {
    let spec = specs::nested_abc();
    let order: Vec<&str> = spec.tests().map(|t| t.description()).collect();
    assert_eq!(order, vec!["t1", "t3", "t2"]);

    // Restartable: a second pass yields the same sequence.
    let again: Vec<&str> = spec.tests().map(|t| t.description()).collect();
    assert_eq!(order, again);
}

#[test_case("t1", SuiteAddress::new(0, vec![], 0) ; "first root test")]
#[test_case("t3", SuiteAddress::new(0, vec![], 1) ; "second root test")]
#[test_case("t2", SuiteAddress::new(0, vec![0], 0) ; "nested test")]
fn nested_tree_addresses(description: &str, expected: SuiteAddress) {
    let suite = Suite::new(vec![specs::nested_abc()]);
    let test = suite
        .tests()
        .find(|t| t.description() == description)
        .expect("test is declared");
    assert_eq!(suite.get_address_for_test(test).unwrap(), expected);
}

#[test]
fn every_address_resolves_back_to_its_test() {
    let mut deep = Spec::new();
    deep.describe("root", |s| {
        s.describe("one", |s| {
            s.describe("two", |s| {
                s.it("deepest", |_| async { anyhow::Ok(()) });
            });
            s.it("middle", |_| async { anyhow::Ok(()) });
        });
        s.it("shallow", |_| async { anyhow::Ok(()) });
    });

    let suite = Suite::new(vec![specs::nested_abc(), deep, specs::flat("flat", &["x", "y"])]);
    let mut seen = 0;
    for test in suite.tests() {
        let address = suite.get_address_for_test(test).unwrap();
        let decoded = SuiteAddress::decode(&address.encode().unwrap()).unwrap();
        assert_eq!(suite.get_test_by_address(&decoded), Some(test), "address {}", address);
        seen += 1;
    }
    assert_eq!(seen, 8);
    assert_eq!(suite.total_test_count(), 8);
}

#[test]
fn total_test_count_ignores_nesting_depth() {
    let mut spec = Spec::new();
    spec.describe("level 0", |s| {
        for depth in 0..4 {
            s.it(format!("flat {}", depth), |_| async { anyhow::Ok(()) });
        }
        s.describe("level 1", |s| {
            s.describe("level 2", |s| {
                s.describe("level 3", |s| {
                    s.it("bottom", |_| async { anyhow::Ok(()) });
                });
            });
        });
    });

    assert_eq!(spec.total_test_count(), 5);
    assert_eq!(spec.tests().count(), 5);
    let root = spec.root().unwrap();
    let level1 = root.topics().next().unwrap();
    assert_eq!(level1.total_test_count(), 1);
}

#[test]
fn dangling_addresses_resolve_to_nothing() {
    let suite = Suite::new(vec![specs::nested_abc()]);
    assert!(suite.get_test_by_address(&SuiteAddress::new(1, vec![], 0)).is_none());
    assert!(suite.get_test_by_address(&SuiteAddress::new(0, vec![3], 0)).is_none());
    assert!(suite.get_test_by_address(&SuiteAddress::new(0, vec![0], 1)).is_none());
}

#[test]
fn behavior_text_joins_topic_lineage() {
    let spec = specs::nested_abc();
    let texts: Vec<String> = spec.tests().map(|t| t.behavior_text()).collect();
    assert_eq!(texts, vec!["a t1", "a t3", "a b t2"]);
}
