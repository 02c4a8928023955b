//! Re-numbering and composition of models.

use std::collections::BTreeMap;

use rnl_core::{LinkId, NodeId};
use rnl_gpkg::Value;
use tracing::{debug, info};

use crate::error::{ModelError, ModelResult};
use crate::model::Model;

/// Meta column receiving the original ids when re-numbering.
pub const ORIGINAL_INDEX_POSTFIX: &str = "waterbeheerder";

const REFERENCE_COLUMNS: [&str; 2] = ["meta_from_node_id", "meta_to_node_id"];

/// Old to new node ids.
pub type NodeIndex = BTreeMap<NodeId, NodeId>;

impl Model {
    /// Apply a node_id mapping to nodes, links and every sub-table.
    ///
    /// Every node must be in `index` and the new ids must be unique.
    pub fn reindex_nodes(&mut self, index: &NodeIndex, original_postfix: Option<&str>) -> ModelResult<()> {
        for node_id in self.node_ids() {
            if !index.contains_key(&node_id) {
                return Err(ModelError::invalid(format!("node {node_id} missing from the new index")));
            }
        }
        let mut targets: Vec<NodeId> = index.values().copied().collect();
        targets.sort();
        targets.dedup();
        if targets.len() != index.len() {
            return Err(ModelError::invalid("new node index is not unique"));
        }
        let map = |id: NodeId| index.get(&id).copied().unwrap_or(id);

        let nodes: Vec<_> = self.nodes().cloned().collect();
        for node in &nodes {
            self.take_node(node.node_id)?;
        }
        for mut node in nodes {
            if let Some(postfix) = original_postfix {
                node.set_meta(
                    &format!("meta_node_id_{postfix}"),
                    i64::from(node.node_id.get()),
                );
            }
            node.node_id = map(node.node_id);
            for column in REFERENCE_COLUMNS {
                if let Some(old) = node.meta_value(column).and_then(Value::as_i64)
                    && let Ok(old) = NodeId::try_from(old)
                {
                    node.set_meta(column, i64::from(map(old).get()));
                }
            }
            self.insert_node(node)?;
        }
        for link in self.links_mut() {
            link.from_node_id = map(link.from_node_id);
            link.to_node_id = map(link.to_node_id);
        }
        let kinds: Vec<_> = self.tables().map(|t| t.kind()).collect();
        for kind in kinds {
            if let Some(mut table) = self.remove_table(kind) {
                table.remap_nodes(&map);
                self.set_table(table);
            }
        }
        debug!(nodes = index.len(), "reindexed nodes");
        Ok(())
    }

    /// Apply a link_id mapping to the link table.
    pub fn reindex_links(
        &mut self,
        index: &BTreeMap<LinkId, LinkId>,
        original_postfix: Option<&str>,
    ) -> ModelResult<()> {
        let links: Vec<_> = self.links().cloned().collect();
        for link in &links {
            self.take_link(link.link_id)?;
        }
        for mut link in links {
            if let Some(postfix) = original_postfix {
                link.set_meta(
                    &format!("meta_link_id_{postfix}"),
                    i64::from(link.link_id.get()),
                );
            }
            link.link_id = index.get(&link.link_id).copied().unwrap_or(link.link_id);
            self.insert_link(link)?;
        }
        Ok(())
    }

    /// Renumber node and link ids densely from `node_start` and 1.
    ///
    /// Returns the node mapping; nothing changes when the ids already are
    /// dense from `node_start`.
    pub fn reset_index(&mut self, node_start: NodeId) -> ModelResult<NodeIndex> {
        let node_ids: Vec<NodeId> = self.node_ids().collect();
        let dense = node_ids
            .iter()
            .enumerate()
            .all(|(i, id)| node_start.offset(i as i64).is_ok_and(|expected| expected == *id));
        let mut index = NodeIndex::new();
        if dense {
            for id in node_ids {
                index.insert(id, id);
            }
        } else {
            for (i, id) in node_ids.iter().enumerate() {
                index.insert(*id, node_start.offset(i as i64)?);
            }
            self.reindex_nodes(&index, None)?;
        }

        let link_ids: Vec<LinkId> = self.links().map(|l| l.link_id).collect();
        let links_dense = link_ids
            .iter()
            .enumerate()
            .all(|(i, id)| LinkId::MIN.offset(i as i64).is_ok_and(|expected| expected == *id));
        if !links_dense {
            let mut links = BTreeMap::new();
            for (i, id) in link_ids.iter().enumerate() {
                links.insert(*id, LinkId::MIN.offset(i as i64)?);
            }
            self.reindex_links(&links, None)?;
        }
        info!(node_start = %node_start, nodes = self.node_count(), links = self.link_count(), "reset index");
        Ok(index)
    }

    /// Prefix every node and link id: `id -> prefix * 10^max_digits + id`.
    ///
    /// Original ids are kept in `meta_node_id_<postfix>` / `meta_link_id_<postfix>`.
    pub fn prefix_index(
        &mut self,
        prefix: u32,
        max_digits: u32,
        original_postfix: Option<&str>,
    ) -> ModelResult<()> {
        let scale = 10_i64
            .checked_pow(max_digits)
            .ok_or_else(|| ModelError::invalid(format!("max_digits {max_digits} too large")))?;
        let base = i64::from(prefix) * scale;
        let prefixed = |id: u32| -> ModelResult<i64> {
            if i64::from(id) >= scale {
                return Err(ModelError::invalid(format!(
                    "id {id} has more than {max_digits} digits"
                )));
            }
            Ok(base + i64::from(id))
        };
        let mut nodes = NodeIndex::new();
        for node_id in self.node_ids() {
            nodes.insert(node_id, NodeId::try_from(prefixed(node_id.get())?)?);
        }
        let mut links = BTreeMap::new();
        for link in self.links() {
            links.insert(link.link_id, LinkId::try_from(prefixed(link.link_id.get())?)?);
        }
        self.reindex_nodes(&nodes, original_postfix)?;
        self.reindex_links(&links, original_postfix)?;
        info!(prefix, max_digits, "prefixed index");
        Ok(())
    }

    /// Shift every node and link id by a constant offset.
    fn shift_ids(&mut self, node_offset: i64, link_offset: i64) -> ModelResult<()> {
        let mut nodes = NodeIndex::new();
        for node_id in self.node_ids() {
            nodes.insert(node_id, node_id.offset(node_offset)?);
        }
        let mut links = BTreeMap::new();
        for link in self.links() {
            links.insert(link.link_id, link.link_id.offset(link_offset)?);
        }
        self.reindex_nodes(&nodes, None)?;
        self.reindex_links(&links, None)
    }

    /// Move all nodes, links and rows of `other` into this model.
    ///
    /// `other`'s ids are shifted past this model's maxima first.
    pub fn merge(&mut self, mut other: Model) -> ModelResult<()> {
        let node_offset = match (self.max_node_id(), other.node_ids().next()) {
            (Some(max), Some(min)) => i64::from(max.get()) + 1 - i64::from(min.get()),
            _ => 0,
        };
        let link_offset = match (self.max_link_id(), other.links().next()) {
            (Some(max), Some(first)) => i64::from(max.get()) + 1 - i64::from(first.link_id.get()),
            _ => 0,
        };
        other.shift_ids(node_offset, link_offset)?;

        let nodes: Vec<_> = other.nodes().cloned().collect();
        for node in nodes {
            self.insert_node(node)?;
        }
        let links: Vec<_> = other.links().cloned().collect();
        for link in links {
            self.insert_link(link)?;
        }
        let tables: Vec<_> = other.tables().cloned().collect();
        for table in tables {
            let kind = table.kind();
            match self.remove_table(kind) {
                Some(mut existing) => {
                    existing.append(table)?;
                    self.set_table(existing);
                }
                None => self.set_table(table),
            }
        }
        debug!(node_offset, link_offset, "merged model");
        Ok(())
    }
}

/// Join models first-to-last into one model.
pub fn concat(models: Vec<Model>) -> ModelResult<Model> {
    concat_with_attributes(models, &BTreeMap::new())
}

/// Join models, writing `attributes[key][i]` on every node and link of model `i`.
pub fn concat_with_attributes(
    models: Vec<Model>,
    attributes: &BTreeMap<String, Vec<Value>>,
) -> ModelResult<Model> {
    for (key, values) in attributes {
        if values.len() != models.len() {
            return Err(ModelError::invalid(format!(
                "length of attribute-list '{key}' not equal to number of models: {} != {}",
                values.len(),
                models.len()
            )));
        }
    }
    let mut models = models.into_iter().enumerate();
    let Some((_, mut combined)) = models.next() else {
        return Err(ModelError::invalid("nothing to concat"));
    };
    tag(&mut combined, attributes, 0);
    for (i, mut model) in models {
        tag(&mut model, attributes, i);
        combined.merge(model)?;
    }
    info!(nodes = combined.node_count(), links = combined.link_count(), "concatenated models");
    Ok(combined)
}

fn tag(model: &mut Model, attributes: &BTreeMap<String, Vec<Value>>, i: usize) {
    for (key, values) in attributes {
        for node in model.nodes_mut() {
            node.set_meta(key, values[i].clone());
        }
        for link in model.links_mut() {
            link.set_meta(key, values[i].clone());
        }
    }
}

/// Split a model into one model per partition of node ids.
///
/// Links are kept when both ends are in the same partition; nodes outside
/// every partition are dropped.
pub fn split(model: &Model, partitions: &[Vec<NodeId>]) -> ModelResult<Vec<Model>> {
    let mut parts = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let mut part = Model::new(model.config.clone());
        part.set_tolerance(model.tolerance());
        for node_id in partition {
            part.insert_node(model.node(*node_id)?.clone())?;
        }
        for link in model.links() {
            if part.has_node(link.from_node_id) && part.has_node(link.to_node_id) {
                part.insert_link(link.clone())?;
            }
        }
        for table in model.tables() {
            let mut table = table.clone();
            table.retain_nodes(|id| part.has_node(id));
            if !table.is_empty() {
                part.set_table(table);
            }
        }
        parts.push(part);
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::NodeType;
    use crate::tables::{BasinArea, BasinProfile, PumpStatic};
    use crate::test_support::{id, two_basin_model};

    #[test]
    fn reset_index_is_dense() {
        let mut model = two_basin_model();
        model.prefix_index(3, 4, Some(ORIGINAL_INDEX_POSTFIX)).unwrap();
        assert!(model.has_node(id(30002)));
        assert_eq!(
            model.node(id(30002)).unwrap().meta_value("meta_node_id_waterbeheerder"),
            Some(&Value::Integer(2))
        );
        let index = model.reset_index(NodeId::MIN).unwrap();
        assert_eq!(index[&id(30003)], id(3));
        assert_eq!(model.node_ids().collect::<Vec<_>>(), vec![id(1), id(2), id(3)]);
        assert_eq!(model.table::<PumpStatic>()[0].node_id, id(2));
        assert_eq!(model.find_link(id(1), id(2)).map(|l| l.link_id.get()), Some(1));
    }

    #[test]
    fn reset_index_on_dense_model_is_noop() {
        let mut model = two_basin_model();
        let before = model.clone();
        model.reset_index(NodeId::MIN).unwrap();
        assert_eq!(model, before);
    }

    #[test]
    fn prefix_rejects_wide_ids() {
        let mut model = two_basin_model();
        assert!(model.prefix_index(1, 0, None).is_err());
    }

    #[test]
    fn concat_offsets_second_model() {
        let a = two_basin_model();
        let b = two_basin_model();
        let attributes = BTreeMap::from([(
            "meta_waterbeheerder".to_string(),
            vec![Value::from("A"), Value::from("B")],
        )]);
        let model = concat_with_attributes(vec![a, b], &attributes).unwrap();
        assert_eq!(model.node_count(), 6);
        assert_eq!(model.link_count(), 4);
        assert_eq!(model.node_type(id(5)).unwrap(), NodeType::Pump);
        assert_eq!(model.node(id(6)).unwrap().meta_str("meta_waterbeheerder"), Some("B"));
        assert!(model.find_link(id(4), id(5)).is_some());
        assert_eq!(model.table::<BasinArea>().len(), 4);
        assert_eq!(model.rows_of::<BasinProfile>(id(6)).count(), 2);
    }

    #[test]
    fn attribute_lengths_must_match() {
        let attributes =
            BTreeMap::from([("meta_x".to_string(), vec![Value::from(1_i64)])]);
        let err = concat_with_attributes(vec![two_basin_model(), two_basin_model()], &attributes);
        assert!(err.is_err());
    }

    #[test]
    fn split_then_concat_restores_model() {
        let model = two_basin_model();
        let parts = split(&model, &[vec![id(1), id(2), id(3)]]).unwrap();
        let joined = concat(parts).unwrap();
        assert_eq!(joined, model);
    }
}
