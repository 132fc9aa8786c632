use serde_json::{Map, Value};

use crate::types::{Node, PropertyDef};

/// Merges PropertyDef defaults from a prototype chain (nearest-first, as
/// returned by `Ksg::prototype_chain`) under an instance's own props.
///
/// Defaults are applied root-to-nearest so a closer prototype's default
/// wins over a farther ancestor's (spec §4.2: "child values overriding
/// parent defaults"); the instance's own props always win over every
/// default.
#[must_use]
pub fn hydrate_props(instance_props: &Map<String, Value>, chain: &[Node]) -> Map<String, Value> {
    let mut merged = Map::new();
    for prototype in chain.iter().rev() {
        let defs: Vec<PropertyDef> = prototype
            .props
            .get("propertyDefs")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        for def in defs {
            if let Some(default) = def.default {
                merged.insert(def.name, default);
            }
        }
    }
    for (k, v) in instance_props {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cardinality, NodeKind, Provenance, ValueType};
    use serde_json::json;
    use uuid::Uuid;

    fn prototype_with_defaults(name: &str, defs: Vec<PropertyDef>) -> Node {
        let mut node = Node::new(NodeKind::Prototype.as_str(), Provenance::new("test", Uuid::new_v4()));
        node.props.insert("name".into(), json!(name));
        node.props
            .insert("propertyDefs".into(), serde_json::to_value(defs).unwrap());
        node
    }

    #[test]
    fn nearest_prototype_default_wins_over_ancestor() {
        let root = prototype_with_defaults(
            "Root",
            vec![PropertyDef::new("retries", ValueType::Number, Cardinality::ZeroOrOne)
                .with_default(json!(1))],
        );
        let child = prototype_with_defaults(
            "Child",
            vec![PropertyDef::new("retries", ValueType::Number, Cardinality::ZeroOrOne)
                .with_default(json!(3))],
        );
        let chain = vec![child, root];
        let instance_props = Map::new();
        let merged = hydrate_props(&instance_props, &chain);
        assert_eq!(merged.get("retries"), Some(&json!(3)));
    }

    #[test]
    fn instance_props_override_every_default() {
        let root = prototype_with_defaults(
            "Root",
            vec![PropertyDef::new("retries", ValueType::Number, Cardinality::ZeroOrOne)
                .with_default(json!(1))],
        );
        let mut instance_props = Map::new();
        instance_props.insert("retries".into(), json!(9));
        let merged = hydrate_props(&instance_props, std::slice::from_ref(&root));
        assert_eq!(merged.get("retries"), Some(&json!(9)));
    }
}
