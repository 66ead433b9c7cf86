use serde_json::{Map, Value, json};

use crate::schema::{SchemaTree, TypeId};

const PROPERTIES_KEY: &str = "properties";

impl SchemaTree {
    /// Aggregates the mapping directives declared on fields into one index mapping.
    ///
    /// Children are nested as `object` properties under their parent field. Nodes without any
    /// directive, directly or below them, contribute nothing; `None` means no field of the tree
    /// declares one.
    pub fn mapping(&self) -> Option<Value> {
        self.node_properties(self.root_id())
            .map(|properties| json!({ PROPERTIES_KEY: properties }))
    }

    fn node_properties(&self, id: TypeId) -> Option<Map<String, Value>> {
        let node = self.node(id);
        let mut properties = Map::new();

        for field in node.fields() {
            if let Some(mappings) = field.mappings.as_ref().filter(|m| !m.is_empty()) {
                properties.insert(field.name.clone(), Value::Object(mappings.clone()));
            }
        }

        for child_id in node.children() {
            let child = self.node(*child_id);
            if let (Some(field), Some(child_properties)) =
                (child.parent_field(), self.node_properties(*child_id))
            {
                properties.insert(
                    field.to_string(),
                    json!({ "type": "object", PROPERTIES_KEY: child_properties }),
                );
            }
        }

        (!properties.is_empty()).then_some(properties)
    }
}
