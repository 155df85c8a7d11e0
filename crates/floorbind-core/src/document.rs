//! Graphic-node arena: the core's view of the loaded vector document.
//!
//! The binding engine never touches a real rendering surface. Instead it
//! operates on this arena of graphic nodes addressed by copyable handles,
//! with elements looked up by their stable id. A rendering adapter owns
//! the mapping from arena nodes to real SVG nodes and mirrors mutations;
//! the engine's logic stays fully testable in memory.
//!
//! Handles are valid only for the document they came from and are
//! discarded wholesale on reconfiguration.

use std::collections::{BTreeMap, BTreeSet};

use floorbind_types::ElementId;

/// Errors raised by arena operations.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// A handle did not resolve to a live node in this document.
    #[error("stale or foreign node handle: {0:?}")]
    StaleHandle(NodeHandle),

    /// An element id is already taken by another node.
    #[error("duplicate element id: {0}")]
    DuplicateId(ElementId),
}

/// Copyable handle to one node in a [`GraphicDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(usize);

/// Axis-aligned bounding box in graphic units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Construct a rect from origin and size.
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// One node of the graphic document.
#[derive(Debug, Clone, Default)]
pub struct GraphicNode {
    /// Tag name (`rect`, `g`, `text`, ...).
    pub tag: String,
    /// Stable element id, if the node carries one.
    pub id: Option<ElementId>,
    /// Parent handle; `None` for the root and for detached nodes.
    pub parent: Option<NodeHandle>,
    /// Ordered child handles.
    pub children: Vec<NodeHandle>,
    /// Inline style properties.
    pub styles: BTreeMap<String, String>,
    /// CSS class set.
    pub classes: BTreeSet<String>,
    /// Non-style attributes.
    pub attributes: BTreeMap<String, String>,
    /// Text content, for text-bearing nodes.
    pub text: Option<String>,
    /// Bounding box, if layout information is available.
    pub bbox: Option<Rect>,
}

/// Preserved visual state of a node, captured before any rule touches it.
///
/// Restoring a baseline before re-applying a state-driven style is what
/// keeps rule application idempotent: the result of a pass depends only on
/// the current state, never on residue from earlier passes.
#[derive(Debug, Clone, Default)]
pub struct NodeBaseline {
    styles: BTreeMap<String, String>,
    classes: BTreeSet<String>,
    attributes: BTreeMap<String, String>,
    text: Option<String>,
}

/// Index-addressed arena of graphic nodes with id lookup.
#[derive(Debug)]
pub struct GraphicDocument {
    nodes: Vec<GraphicNode>,
    by_id: BTreeMap<ElementId, NodeHandle>,
    root: NodeHandle,
}

impl Default for GraphicDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicDocument {
    /// Create an empty document with a root `svg` node.
    pub fn new() -> Self {
        let root = GraphicNode {
            tag: "svg".to_owned(),
            ..GraphicNode::default()
        };
        Self {
            nodes: vec![root],
            by_id: BTreeMap::new(),
            root: NodeHandle(0),
        }
    }

    /// The root node handle.
    pub const fn root(&self) -> NodeHandle {
        self.root
    }

    /// Borrow a node.
    pub fn node(&self, handle: NodeHandle) -> Option<&GraphicNode> {
        self.nodes.get(handle.0)
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut GraphicNode, DocumentError> {
        self.nodes
            .get_mut(handle.0)
            .ok_or(DocumentError::StaleHandle(handle))
    }

    /// Look up a node by its element id.
    pub fn find_by_id(&self, id: &ElementId) -> Option<NodeHandle> {
        self.by_id.get(id).copied()
    }

    /// Resolve a `#id` selector or bare element id to a node.
    pub fn resolve_selector(&self, selector: &str) -> Option<NodeHandle> {
        self.find_by_id(&ElementId::from_selector(selector))
    }

    /// Append a child node under `parent`.
    ///
    /// # Errors
    ///
    /// [`DocumentError::StaleHandle`] for an invalid parent and
    /// [`DocumentError::DuplicateId`] when `id` is already registered.
    pub fn create_node(
        &mut self,
        parent: NodeHandle,
        tag: impl Into<String>,
        id: Option<ElementId>,
    ) -> Result<NodeHandle, DocumentError> {
        if let Some(id) = &id
            && self.by_id.contains_key(id)
        {
            return Err(DocumentError::DuplicateId(id.clone()));
        }
        if self.nodes.get(parent.0).is_none() {
            return Err(DocumentError::StaleHandle(parent));
        }
        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(GraphicNode {
            tag: tag.into(),
            id: id.clone(),
            parent: Some(parent),
            ..GraphicNode::default()
        });
        self.node_mut(parent)?.children.push(handle);
        if let Some(id) = id {
            self.by_id.insert(id, handle);
        }
        Ok(handle)
    }

    /// Insert a new node as the sibling immediately after `anchor`.
    ///
    /// This is the `overlay` placement primitive: the anchor node itself is
    /// left untouched and the new node layers on top of it in paint order.
    pub fn insert_after(
        &mut self,
        anchor: NodeHandle,
        tag: impl Into<String>,
        id: Option<ElementId>,
    ) -> Result<NodeHandle, DocumentError> {
        let parent = self
            .node(anchor)
            .ok_or(DocumentError::StaleHandle(anchor))?
            .parent
            .unwrap_or(self.root);
        let handle = self.create_node(parent, tag, id)?;
        // create_node appended; move into position just after the anchor.
        let children = &mut self.node_mut(parent)?.children;
        children.retain(|child| *child != handle);
        let position = children
            .iter()
            .position(|child| *child == anchor)
            .map_or(children.len(), |index| index.saturating_add(1));
        children.insert(position, handle);
        Ok(handle)
    }

    /// Detach all children of a node, unregistering the ids of the removed
    /// subtree. The node's own id and position are preserved.
    ///
    /// This is the `replace` placement primitive.
    pub fn replace_children(&mut self, handle: NodeHandle) -> Result<(), DocumentError> {
        let children = std::mem::take(&mut self.node_mut(handle)?.children);
        for child in children {
            self.detach_subtree(child);
        }
        Ok(())
    }

    fn detach_subtree(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get_mut(handle.0) else {
            return;
        };
        node.parent = None;
        if let Some(id) = node.id.clone() {
            self.by_id.remove(&id);
        }
        let children = std::mem::take(&mut node.children);
        for child in children {
            self.detach_subtree(child);
        }
    }

    /// Whether the node is attached to the document tree.
    pub fn is_attached(&self, handle: NodeHandle) -> bool {
        handle == self.root || self.node(handle).and_then(|node| node.parent).is_some()
    }

    /// Element ids of all attached descendants of a node, in tree order.
    ///
    /// Group expansion uses this: a rule's `groups` entry names a `g`
    /// element and binds to every identified member below it.
    pub fn descendant_ids(&self, handle: NodeHandle) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeHandle> = self
            .node(handle)
            .map(|node| node.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            if let Some(node) = self.node(current) {
                if let Some(id) = &node.id {
                    out.push(id.clone());
                }
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Set one inline style property.
    pub fn set_style(
        &mut self,
        handle: NodeHandle,
        property: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), DocumentError> {
        self.node_mut(handle)?
            .styles
            .insert(property.into(), value.into());
        Ok(())
    }

    /// Apply a `prop: value; prop2: value2` style block.
    pub fn set_style_block(
        &mut self,
        handle: NodeHandle,
        block: &str,
    ) -> Result<(), DocumentError> {
        for declaration in block.split(';') {
            if let Some((property, value)) = declaration.split_once(':') {
                let property = property.trim();
                if !property.is_empty() {
                    self.set_style(handle, property, value.trim())?;
                }
            }
        }
        Ok(())
    }

    /// Read one inline style property.
    pub fn style(&self, handle: NodeHandle, property: &str) -> Option<&str> {
        self.node(handle)?.styles.get(property).map(String::as_str)
    }

    /// Replace the node's class set.
    pub fn set_classes(
        &mut self,
        handle: NodeHandle,
        classes: impl IntoIterator<Item = String>,
    ) -> Result<(), DocumentError> {
        self.node_mut(handle)?.classes = classes.into_iter().collect();
        Ok(())
    }

    /// Toggle one class on the node.
    pub fn toggle_class(&mut self, handle: NodeHandle, class: &str) -> Result<(), DocumentError> {
        let classes = &mut self.node_mut(handle)?.classes;
        if !classes.remove(class) {
            classes.insert(class.to_owned());
        }
        Ok(())
    }

    /// Whether the node carries the class.
    pub fn has_class(&self, handle: NodeHandle, class: &str) -> bool {
        self.node(handle).is_some_and(|node| node.classes.contains(class))
    }

    /// Set a non-style attribute.
    pub fn set_attribute(
        &mut self,
        handle: NodeHandle,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), DocumentError> {
        self.node_mut(handle)?
            .attributes
            .insert(name.into(), value.into());
        Ok(())
    }

    /// Read a non-style attribute.
    pub fn attribute(&self, handle: NodeHandle, name: &str) -> Option<&str> {
        self.node(handle)?.attributes.get(name).map(String::as_str)
    }

    /// Set the node's text content.
    pub fn set_text(
        &mut self,
        handle: NodeHandle,
        text: impl Into<String>,
    ) -> Result<(), DocumentError> {
        self.node_mut(handle)?.text = Some(text.into());
        Ok(())
    }

    /// Read the node's text content.
    pub fn text(&self, handle: NodeHandle) -> Option<&str> {
        self.node(handle)?.text.as_deref()
    }

    /// Record layout information for a node.
    pub fn set_bbox(&mut self, handle: NodeHandle, bbox: Rect) -> Result<(), DocumentError> {
        self.node_mut(handle)?.bbox = Some(bbox);
        Ok(())
    }

    /// The node's bounding box, if layout information is available.
    pub fn bbox(&self, handle: NodeHandle) -> Option<Rect> {
        self.node(handle)?.bbox
    }

    /// Capture the node's visual state as a baseline for later restoration.
    pub fn snapshot(&self, handle: NodeHandle) -> Option<NodeBaseline> {
        self.node(handle).map(|node| NodeBaseline {
            styles: node.styles.clone(),
            classes: node.classes.clone(),
            attributes: node.attributes.clone(),
            text: node.text.clone(),
        })
    }

    /// Restore a node's visual state from a baseline.
    pub fn restore(
        &mut self,
        handle: NodeHandle,
        baseline: &NodeBaseline,
    ) -> Result<(), DocumentError> {
        let node = self.node_mut(handle)?;
        node.styles = baseline.styles.clone();
        node.classes = baseline.classes.clone();
        node.attributes = baseline.attributes.clone();
        node.text.clone_from(&baseline.text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(id: &str) -> (GraphicDocument, NodeHandle) {
        let mut doc = GraphicDocument::new();
        let root = doc.root();
        let handle = doc
            .create_node(root, "rect", Some(ElementId::from(id)))
            .unwrap_or(root);
        (doc, handle)
    }

    #[test]
    fn id_lookup_and_selector_resolution() {
        let (doc, handle) = doc_with("target");
        assert_eq!(doc.find_by_id(&ElementId::from("target")), Some(handle));
        assert_eq!(doc.resolve_selector("#target"), Some(handle));
        assert_eq!(doc.resolve_selector("target"), Some(handle));
        assert!(doc.resolve_selector("#missing").is_none());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (mut doc, _) = doc_with("target");
        let root = doc.root();
        let result = doc.create_node(root, "rect", Some(ElementId::from("target")));
        assert!(matches!(result, Err(DocumentError::DuplicateId(_))));
    }

    #[test]
    fn insert_after_places_sibling_in_paint_order() {
        let (mut doc, anchor) = doc_with("target");
        let root = doc.root();
        let trailing = doc.create_node(root, "rect", None).unwrap_or(root);
        let overlay = doc
            .insert_after(anchor, "g", Some(ElementId::from("overlay")))
            .unwrap_or(root);

        let children = doc.node(root).map(|n| n.children.clone()).unwrap_or_default();
        assert_eq!(children, vec![anchor, overlay, trailing]);
        // Anchor untouched.
        assert_eq!(doc.find_by_id(&ElementId::from("target")), Some(anchor));
    }

    #[test]
    fn replace_children_preserves_id_and_unregisters_subtree() {
        let (mut doc, target) = doc_with("target");
        let child = doc
            .create_node(target, "text", Some(ElementId::from("label")))
            .unwrap_or(target);
        assert!(doc.is_attached(child));

        doc.replace_children(target).unwrap_or(());

        assert_eq!(doc.find_by_id(&ElementId::from("target")), Some(target));
        assert!(doc.find_by_id(&ElementId::from("label")).is_none());
        assert!(!doc.is_attached(child));
        assert!(doc.node(target).is_some_and(|n| n.children.is_empty()));
    }

    #[test]
    fn descendant_ids_walk_in_tree_order() {
        let mut doc = GraphicDocument::new();
        let root = doc.root();
        let group = doc
            .create_node(root, "g", Some(ElementId::from("lights")))
            .unwrap_or(root);
        let _first = doc.create_node(group, "rect", Some(ElementId::from("light-1")));
        let inner = doc.create_node(group, "g", None).unwrap_or(root);
        let _nested = doc.create_node(inner, "rect", Some(ElementId::from("light-2")));

        assert_eq!(
            doc.descendant_ids(group),
            vec![ElementId::from("light-1"), ElementId::from("light-2")]
        );
    }

    #[test]
    fn snapshot_and_restore_round_trip() {
        let (mut doc, handle) = doc_with("target");
        doc.set_style(handle, "fill", "red").unwrap_or(());
        let baseline = doc.snapshot(handle).unwrap_or_default();

        doc.set_style(handle, "fill", "blue").unwrap_or(());
        doc.set_text(handle, "mutated").unwrap_or(());
        doc.toggle_class(handle, "alert").unwrap_or(());

        doc.restore(handle, &baseline).unwrap_or(());
        assert_eq!(doc.style(handle, "fill"), Some("red"));
        assert!(doc.text(handle).is_none());
        assert!(!doc.has_class(handle, "alert"));
    }

    #[test]
    fn style_block_parses_multiple_declarations() {
        let (mut doc, handle) = doc_with("target");
        doc.set_style_block(handle, "height: 10px; opacity: 0.5;")
            .unwrap_or(());
        assert_eq!(doc.style(handle, "height"), Some("10px"));
        assert_eq!(doc.style(handle, "opacity"), Some("0.5"));
    }
}
