//! Reactive evaluation against a mock cell runtime: values recompute when
//! inputs change, deps degrade to paths, and only the children an
//! expression touches are ever read.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use mantra::{parse, reactive_env, CellRuntime, ComputedValueExpr, ControlCell, Segment};
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// MOCK CELL TREE
// ============================================================================

enum MockData {
    Leaf(RefCell<serde_json::Value>),
    Arr(Vec<Rc<MockCell>>),
    Obj(Vec<(String, Rc<MockCell>)>),
}

struct MockCell {
    data: MockData,
    reads: Cell<usize>,
}

impl MockCell {
    fn snapshot(&self) -> serde_json::Value {
        match &self.data {
            MockData::Leaf(value) => value.borrow().clone(),
            MockData::Arr(items) => {
                serde_json::Value::Array(items.iter().map(|c| c.snapshot()).collect())
            }
            MockData::Obj(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, c)| (k.clone(), c.snapshot()))
                    .collect(),
            ),
        }
    }
}

impl ControlCell for MockCell {
    fn read(&self) -> serde_json::Value {
        self.reads.set(self.reads.get() + 1);
        self.snapshot()
    }

    fn write(&self, value: serde_json::Value) {
        match &self.data {
            MockData::Leaf(slot) => *slot.borrow_mut() = value,
            _ => panic!("mock only writes leaves"),
        }
    }

    fn child(&self, segment: &Segment) -> Option<Rc<dyn ControlCell>> {
        match (&self.data, segment) {
            (MockData::Arr(items), Segment::Index(i)) => {
                items.get(*i).map(|c| c.clone() as Rc<dyn ControlCell>)
            }
            (MockData::Obj(fields), Segment::Field(name)) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, c)| c.clone() as Rc<dyn ControlCell>),
            _ => None,
        }
    }
}

/// Builds a cell tree and an index of every cell by its path string.
fn build(data: &serde_json::Value) -> (Rc<MockCell>, HashMap<String, Rc<MockCell>>) {
    let mut index = HashMap::new();
    let root = build_node(data, String::new(), &mut index);
    (root, index)
}

fn build_node(
    data: &serde_json::Value,
    path: String,
    index: &mut HashMap<String, Rc<MockCell>>,
) -> Rc<MockCell> {
    let cell = match data {
        serde_json::Value::Array(items) => Rc::new(MockCell {
            data: MockData::Arr(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| build_node(item, format!("{path}[{i}]"), index))
                    .collect(),
            ),
            reads: Cell::new(0),
        }),
        serde_json::Value::Object(fields) => Rc::new(MockCell {
            data: MockData::Obj(
                fields
                    .iter()
                    .map(|(k, v)| {
                        let child_path = if path.is_empty() {
                            k.clone()
                        } else {
                            format!("{path}.{k}")
                        };
                        (k.clone(), build_node(v, child_path, index))
                    })
                    .collect(),
            ),
            reads: Cell::new(0),
        }),
        leaf => Rc::new(MockCell {
            data: MockData::Leaf(RefCell::new(leaf.clone())),
            reads: Cell::new(0),
        }),
    };
    index.insert(path, cell.clone());
    cell
}

// ============================================================================
// MOCK RUNTIME
// ============================================================================

struct ComputedSlot {
    value: RefCell<serde_json::Value>,
    compute: Rc<dyn Fn() -> serde_json::Value>,
}

impl ControlCell for ComputedSlot {
    fn read(&self) -> serde_json::Value {
        self.value.borrow().clone()
    }

    fn write(&self, _value: serde_json::Value) {
        panic!("computed cells are not writable");
    }

    fn child(&self, _segment: &Segment) -> Option<Rc<dyn ControlCell>> {
        None
    }
}

/// The simplest possible runtime: computed cells evaluate eagerly and
/// recompute when the test says inputs changed.
#[derive(Default)]
struct MockRuntime {
    slots: RefCell<Vec<Rc<ComputedSlot>>>,
}

impl MockRuntime {
    fn flush(&self) {
        for slot in self.slots.borrow().iter() {
            *slot.value.borrow_mut() = (slot.compute)();
        }
    }
}

impl CellRuntime for MockRuntime {
    fn computed(&self, compute: Rc<dyn Fn() -> serde_json::Value>) -> Rc<dyn ControlCell> {
        let slot = Rc::new(ComputedSlot {
            value: RefCell::new(compute()),
            compute,
        });
        self.slots.borrow_mut().push(slot.clone());
        slot
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn computed_values_recompute_on_input_change() {
    let (root, cells) = build(&json!({"a": 5, "b": 3}));
    let runtime = MockRuntime::default();
    let env = reactive_env(root);
    let ast = parse("a + b").unwrap();
    let computed = ComputedValueExpr::new(&runtime, &env, &ast);
    assert_eq!(computed.value().as_number(), Some(8.0));

    cells["a"].write(json!(10));
    runtime.flush();
    assert_eq!(computed.value().as_number(), Some(13.0));
}

#[test]
fn reactive_deps_are_paths() {
    let (root, _) = build(&json!({"cond": true, "t": "yes", "e": "no"}));
    let runtime = MockRuntime::default();
    let env = reactive_env(root);
    let ast = parse("cond ? t : e").unwrap();
    let computed = ComputedValueExpr::new(&runtime, &env, &ast);
    assert_eq!(computed.value().as_str(), Some("yes"));

    let paths: Vec<String> = computed
        .dependency_paths()
        .iter()
        .map(|p| p.to_string())
        .collect();
    assert!(paths.contains(&"cond".to_string()), "{paths:?}");
    assert!(paths.contains(&"t".to_string()), "{paths:?}");
    assert!(!paths.contains(&"e".to_string()), "untaken branch tracked: {paths:?}");
}

#[test]
fn only_touched_children_are_read() {
    let (root, cells) = build(&json!({"a": 1, "b": 2}));
    let runtime = MockRuntime::default();
    let env = reactive_env(root);
    let ast = parse("a + 1").unwrap();
    let computed = ComputedValueExpr::new(&runtime, &env, &ast);
    assert_eq!(computed.value().as_number(), Some(2.0));

    assert!(cells["a"].reads.get() > 0, "the read side was never tracked");
    assert_eq!(cells["b"].reads.get(), 0, "untouched child was read");
}

#[test]
fn sequences_project_through_cells() {
    let (root, cells) = build(&json!({"nums": [1, 2, 3, 4, 5]}));
    let runtime = MockRuntime::default();
    let env = reactive_env(root);
    let ast = parse("$sum(nums[$i => $this() >= 3])").unwrap();
    let computed = ComputedValueExpr::new(&runtime, &env, &ast);
    assert_eq!(computed.value().as_number(), Some(12.0));

    let paths: Vec<String> = computed
        .dependency_paths()
        .iter()
        .map(|p| p.to_string())
        .collect();
    assert!(paths.contains(&"nums[2]".to_string()), "{paths:?}");

    cells["nums[0]"].write(json!(9));
    runtime.flush();
    assert_eq!(computed.value().as_number(), Some(21.0));
}
