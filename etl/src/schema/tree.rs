use std::collections::{HashMap, HashSet};

use config::shared::{
    FieldConfig, FieldType, Relation, SchemaConfig, SortOrder, TableConfig, TypeConfig,
};
use serde_json::{Map, Value};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::schema::ALIAS_SEPARATOR;

/// Index of a node inside its [`SchemaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(usize);

/// A projected column of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Key of the field inside its node's document.
    pub name: String,
    pub sql_expression: String,
    pub field_type: FieldType,
    pub mappings: Option<Map<String, Value>>,
    /// Select-list alias, unique across the tree (`orders___lines___lineId`).
    pub alias: String,
    /// Dotted path of the field from the document root (`lines.lineId`).
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    field: usize,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRule {
    pub name: String,
    field: usize,
    pub where_filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    name: String,
    path: Option<String>,
    parent: Option<TypeId>,
    relation: Relation,
    id_field: usize,
    ref_field: Option<usize>,
    sort_fields: Vec<SortSpec>,
    where_filters: Vec<String>,
    tables: Vec<TableConfig>,
    fields: Vec<FieldSpec>,
    updates: Vec<UpdateRule>,
    children: Vec<TypeId>,
}

impl TypeNode {
    /// Full dotted name of the node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path of the node below the root, `None` for the root itself.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Field of the parent document this node is embedded under.
    pub fn parent_field(&self) -> Option<&str> {
        self.parent.map(|_| self.name.rsplit('.').next().unwrap_or(&self.name))
    }

    pub fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn id_field(&self) -> &FieldSpec {
        &self.fields[self.id_field]
    }

    pub fn ref_field(&self) -> Option<&FieldSpec> {
        self.ref_field.map(|index| &self.fields[index])
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn sort_fields(&self) -> impl Iterator<Item = (&FieldSpec, SortOrder)> {
        self.sort_fields
            .iter()
            .map(|sort| (&self.fields[sort.field], sort.order))
    }

    pub fn where_filters(&self) -> &[String] {
        &self.where_filters
    }

    pub fn tables(&self) -> &[TableConfig] {
        &self.tables
    }

    pub fn updates(&self) -> &[UpdateRule] {
        &self.updates
    }

    /// Field whose increase signals a change under `rule`.
    pub fn update_field(&self, rule: &UpdateRule) -> &FieldSpec {
        &self.fields[rule.field]
    }

    pub fn children(&self) -> &[TypeId] {
        &self.children
    }
}

/// Validated document tree with exactly one root.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaTree {
    nodes: Vec<TypeNode>,
    root: TypeId,
}

impl SchemaTree {
    /// Resolves parent links and field paths, rejecting malformed trees.
    pub fn from_config(config: &SchemaConfig) -> EtlResult<SchemaTree> {
        if config.types.is_empty() {
            bail!(ErrorKind::SchemaDefinitionInvalid, "Schema declares no types");
        }

        let mut ids = HashMap::with_capacity(config.types.len());
        for (index, type_config) in config.types.iter().enumerate() {
            if type_config.name.split('.').any(|segment| segment.trim().is_empty()) {
                bail!(
                    ErrorKind::SchemaDefinitionInvalid,
                    "Type name has an empty segment",
                    type_config.name
                );
            }

            if ids.insert(type_config.name.as_str(), TypeId(index)).is_some() {
                bail!(
                    ErrorKind::SchemaDefinitionInvalid,
                    "Type is declared more than once",
                    type_config.name
                );
            }
        }

        let mut root = None;
        let mut nodes = Vec::with_capacity(config.types.len());
        for type_config in &config.types {
            let parent = match type_config.name.rsplit_once('.') {
                None => {
                    if let Some(TypeId(existing)) = root {
                        bail!(
                            ErrorKind::SchemaDefinitionInvalid,
                            "Schema has more than one root type",
                            format!("{} and {}", config.types[existing].name, type_config.name)
                        );
                    }
                    root = ids.get(type_config.name.as_str()).copied();
                    None
                }
                Some((parent_name, _)) => match ids.get(parent_name) {
                    Some(parent) => Some(*parent),
                    None => bail!(
                        ErrorKind::SchemaDefinitionInvalid,
                        "Parent type is not declared",
                        format!("{} (parent of {})", parent_name, type_config.name)
                    ),
                },
            };

            nodes.push(build_node(type_config, parent)?);
        }

        let Some(root) = root else {
            bail!(ErrorKind::SchemaDefinitionInvalid, "Schema has no root type");
        };

        for index in 0..nodes.len() {
            if let Some(TypeId(parent)) = nodes[index].parent {
                nodes[parent].children.push(TypeId(index));
            }
        }

        let tree = SchemaTree { nodes, root };
        tree.validate_root()?;

        Ok(tree)
    }

    fn validate_root(&self) -> EtlResult<()> {
        let root = self.root();
        if root.ref_field.is_none() {
            bail!(
                ErrorKind::SchemaDefinitionInvalid,
                "Root type must declare a reference field",
                root.name
            );
        }

        match root.tables.first() {
            Some(table) if table.join.is_none() => Ok(()),
            _ => bail!(
                ErrorKind::SchemaDefinitionInvalid,
                "Root type must start with a table that is not joined",
                root.name
            ),
        }
    }

    pub fn root_id(&self) -> TypeId {
        self.root
    }

    pub fn root(&self) -> &TypeNode {
        self.node(self.root)
    }

    pub fn node(&self, id: TypeId) -> &TypeNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in pre-order from the root, children in declaration order.
    pub fn depth_first(&self) -> Vec<TypeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        order
    }

    pub(crate) fn index_of(id: TypeId) -> usize {
        id.0
    }
}

fn build_node(config: &TypeConfig, parent: Option<TypeId>) -> EtlResult<TypeNode> {
    let path = config
        .name
        .split_once('.')
        .map(|(_, below_root)| below_root.to_string());

    let relation = match (parent, config.relation) {
        (None, _) => Relation::One,
        (Some(_), Some(relation)) => relation,
        (Some(_), None) => bail!(
            ErrorKind::SchemaDefinitionInvalid,
            "Child type must declare its relation to the parent",
            config.name
        ),
    };

    let alias_prefix = format!(
        "{}{ALIAS_SEPARATOR}",
        config.name.replace('.', ALIAS_SEPARATOR)
    );
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(config.fields.len());
    for field in &config.fields {
        if !seen.insert(field.name.as_str()) {
            bail!(
                ErrorKind::SchemaDefinitionInvalid,
                "Field is declared more than once",
                format!("{}.{}", config.name, field.name)
            );
        }
        fields.push(build_field(field, &alias_prefix, path.as_deref()));
    }

    let lookup = |name: &str, role: &'static str| -> EtlResult<usize> {
        match fields.iter().position(|field| field.name == name) {
            Some(index) => Ok(index),
            None => bail!(
                ErrorKind::SchemaDefinitionInvalid,
                role,
                format!("{} in type {}", name, config.name)
            ),
        }
    };

    let id_field = lookup(&config.id_field, "Id field is not declared in the field list")?;
    let ref_field = config
        .ref_field
        .as_deref()
        .map(|name| lookup(name, "Reference field is not declared in the field list"))
        .transpose()?;

    let sort_fields = config
        .sort_fields
        .iter()
        .map(|sort| {
            Ok(SortSpec {
                field: lookup(&sort.field, "Sort field is not declared in the field list")?,
                order: sort.order,
            })
        })
        .collect::<EtlResult<Vec<_>>>()?;

    let updates = config
        .updates
        .iter()
        .map(|update| {
            Ok(UpdateRule {
                name: update.name.clone(),
                field: lookup(
                    &update.ref_field,
                    "Update reference field is not declared in the field list",
                )?,
                where_filters: update.where_filters.clone(),
            })
        })
        .collect::<EtlResult<Vec<_>>>()?;

    Ok(TypeNode {
        name: config.name.clone(),
        path,
        parent,
        relation,
        id_field,
        ref_field,
        sort_fields,
        where_filters: config.where_filters.clone(),
        tables: config.tables.clone(),
        fields,
        updates,
        children: Vec::new(),
    })
}

fn build_field(config: &FieldConfig, alias_prefix: &str, node_path: Option<&str>) -> FieldSpec {
    let path = match node_path {
        Some(node_path) => format!("{node_path}.{}", config.name),
        None => config.name.clone(),
    };

    FieldSpec {
        name: config.name.clone(),
        sql_expression: config.sql_expression.clone(),
        field_type: config.field_type,
        mappings: config.mappings.clone(),
        alias: format!("{alias_prefix}{}", config.name),
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::{field, orders_schema, root_table, type_config};

    #[test]
    fn paths_and_aliases_follow_the_tree() {
        let tree = SchemaTree::from_config(&orders_schema()).unwrap();
        let root = tree.root();

        assert_eq!(root.name(), "orders");
        assert_eq!(root.path(), None);
        assert_eq!(root.id_field().alias, "orders___orderId");
        assert_eq!(root.id_field().path, "orderId");

        let lines = tree.node(root.children()[0]);
        assert_eq!(lines.parent_field(), Some("lines"));
        assert_eq!(lines.relation(), Relation::Many);
        let line_id = lines.field("lineId").unwrap();
        assert_eq!(line_id.alias, "orders___lines___lineId");
        assert_eq!(line_id.path, "lines.lineId");
    }

    #[test]
    fn depth_first_visits_children_in_declaration_order() {
        let mut schema = orders_schema();
        let mut customer = type_config("orders.customer", Some(Relation::One), "customerId");
        customer.fields = vec![field("customerId", "c.id", FieldType::Long)];
        let mut address = type_config("orders.customer.address", Some(Relation::One), "addressId");
        address.fields = vec![field("addressId", "a.id", FieldType::Long)];
        schema.types.insert(0, address);
        schema.types.push(customer);

        let tree = SchemaTree::from_config(&schema).unwrap();
        let names: Vec<_> = tree
            .depth_first()
            .into_iter()
            .map(|id| tree.node(id).name().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "orders",
                "orders.lines",
                "orders.customer",
                "orders.customer.address"
            ]
        );
        assert_eq!(
            tree.node(tree.depth_first()[3]).field("addressId").unwrap().path,
            "customer.address.addressId"
        );
    }

    #[test]
    fn missing_parent_is_rejected() {
        let mut schema = orders_schema();
        let mut orphan = type_config("orders.shipments.parcels", Some(Relation::Many), "parcelId");
        orphan.fields = vec![field("parcelId", "p.id", FieldType::Long)];
        schema.types.push(orphan);

        let err = SchemaTree::from_config(&schema).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaDefinitionInvalid);
        assert_eq!(err.description(), "Parent type is not declared");
    }

    #[test]
    fn two_roots_are_rejected() {
        let mut schema = orders_schema();
        let mut invoices = type_config("invoices", None, "invoiceId");
        invoices.fields = vec![field("invoiceId", "i.id", FieldType::Long)];
        schema.types.push(invoices);

        let err = SchemaTree::from_config(&schema).unwrap_err();
        assert_eq!(err.description(), "Schema has more than one root type");
    }

    #[test]
    fn tree_without_root_is_rejected() {
        let mut schema = orders_schema();
        let mut other = type_config("invoices.lines", Some(Relation::Many), "lineId");
        other.fields = vec![field("lineId", "l.id", FieldType::Long)];
        schema.types = vec![other];

        let err = SchemaTree::from_config(&schema).unwrap_err();
        assert_eq!(err.description(), "Parent type is not declared");

        let empty = SchemaConfig { types: vec![] };
        assert_eq!(
            SchemaTree::from_config(&empty).unwrap_err().description(),
            "Schema declares no types"
        );
    }

    #[test]
    fn id_field_must_be_declared() {
        let mut schema = orders_schema();
        schema.types[0].id_field = "id".to_string();

        let err = SchemaTree::from_config(&schema).unwrap_err();
        assert_eq!(err.description(), "Id field is not declared in the field list");
    }

    #[test]
    fn child_without_relation_is_rejected() {
        let mut schema = orders_schema();
        schema.types[1].relation = None;

        let err = SchemaTree::from_config(&schema).unwrap_err();
        assert_eq!(
            err.description(),
            "Child type must declare its relation to the parent"
        );
    }

    #[test]
    fn root_needs_reference_field_and_base_table() {
        let mut schema = orders_schema();
        schema.types[0].ref_field = None;
        assert_eq!(
            SchemaTree::from_config(&schema).unwrap_err().description(),
            "Root type must declare a reference field"
        );

        let mut schema = orders_schema();
        schema.types[0].tables = vec![];
        assert_eq!(
            SchemaTree::from_config(&schema).unwrap_err().description(),
            "Root type must start with a table that is not joined"
        );

        let mut schema = orders_schema();
        schema.types[0].tables = vec![root_table("orders", "o")];
        assert!(SchemaTree::from_config(&schema).is_ok());
    }
}
