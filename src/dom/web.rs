//! WebDocument: [`Document`] over the live page via `web-sys`
//!
//! # Handles
//! Nodes are kept in a slot table. A handle packs the slot index (low 20
//! bits) with a generation (high 12 bits), so a handle to a freed slot is
//! simply unknown instead of aliasing whatever reuses the slot. The handle is
//! also stamped on the node as a JS property, which maps event targets and
//! mutation records back to the handle the engine already holds.
//!
//! # Callbacks
//! The mutation observer and the hover listeners call JS functions supplied
//! by the content script, which forwards them to the session. No Rust
//! closure is handed to the page.

use std::cell::RefCell;

use js_sys::{Array, Function, Object, Reflect};
use log::warn;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, MutationObserver, MutationObserverInit, Node, Window};

use super::{Document, MutationRecord, NodeId, NodeKind, Rect};

const HANDLE_KEY: &str = "__dictcoreNodeId";
const INDEX_BITS: u32 = 20;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u32 = u32::MAX >> INDEX_BITS;

const HOVER_ENTER: &str = "mouseenter";
const HOVER_LEAVE: &str = "mouseleave";

#[derive(Debug, Default)]
struct Slot {
    node: Option<Node>,
    generation: u32,
    retained: u32,
}

#[derive(Debug, Default)]
struct HandleTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl HandleTable {
    fn slot(&self, id: NodeId) -> Option<&Slot> {
        let slot = self.slots.get((id.0 & INDEX_MASK) as usize)?;
        (slot.generation == id.0 >> INDEX_BITS && slot.node.is_some()).then_some(slot)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        let slot = self.slots.get_mut((id.0 & INDEX_MASK) as usize)?;
        (slot.generation == id.0 >> INDEX_BITS && slot.node.is_some()).then_some(slot)
    }

    fn node(&self, id: NodeId) -> Option<Node> {
        self.slot(id).and_then(|slot| slot.node.clone())
    }

    fn stamped(&self, node: &Node) -> Option<NodeId> {
        let value = Reflect::get(node, &JsValue::from_str(HANDLE_KEY)).ok()?.as_f64()?;
        let id = NodeId(value as u32);
        self.slot(id)
            .and_then(|slot| slot.node.as_ref())
            .filter(|known| known.is_same_node(Some(node)))
            .map(|_| id)
    }

    fn handle(&mut self, node: &Node) -> NodeId {
        if let Some(id) = self.stamped(node) {
            return id;
        }
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.node = Some(node.clone());
        slot.retained = 0;
        let id = NodeId((slot.generation << INDEX_BITS) | index);

        if let Err(e) = Reflect::set(node, &JsValue::from_str(HANDLE_KEY), &JsValue::from(id.0)) {
            warn!("could not stamp node handle: {:?}", e);
        }
        id
    }

    fn drop_handle(&mut self, id: NodeId) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        if let Some(node) = slot.node.take() {
            let object: &Object = node.as_ref();
            // A leftover stamp is rejected by the generation check anyway
            let _ = Reflect::delete_property(object, &JsValue::from_str(HANDLE_KEY));
        }
        slot.generation = (slot.generation + 1) & GENERATION_MASK;
        slot.retained = 0;
        self.free.push(id.0 & INDEX_MASK);
    }

    fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

pub struct WebDocument {
    document: web_sys::Document,
    window: Window,
    handles: RefCell<HandleTable>,
    body: Option<NodeId>,
    observer: MutationObserver,
    observing: bool,
    on_hover_enter: Function,
    on_hover_leave: Function,
}

impl WebDocument {
    /// Wrap the current window's document.
    ///
    /// `on_mutation` receives `(records, observer)` like any observer
    /// callback; the hover functions receive the DOM event.
    pub fn new(on_mutation: &Function, on_hover_enter: Function, on_hover_leave: Function) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let document = window.document().ok_or_else(|| JsValue::from_str("no document"))?;
        let observer = MutationObserver::new(on_mutation)?;

        let mut doc = Self {
            document,
            window,
            handles: RefCell::new(HandleTable::default()),
            body: None,
            observer,
            observing: false,
            on_hover_enter,
            on_hover_leave,
        };
        if let Some(body) = doc.document.body() {
            let id = doc.handle(body.as_ref());
            doc.retain(id);
            doc.body = Some(id);
        }
        Ok(doc)
    }

    /// Handle for a live node, reusing the one stamped on it when still valid
    pub fn handle(&self, node: &Node) -> NodeId {
        self.handles.borrow_mut().handle(node)
    }

    /// Live node behind a handle
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.handles.borrow().node(id)
    }

    /// Translate an observer delivery; only added nodes are carried over
    pub fn convert_records(&self, records: &Array) -> Vec<MutationRecord> {
        let mut converted = Vec::with_capacity(records.length() as usize);
        for value in records.iter() {
            let Ok(record) = value.dyn_into::<web_sys::MutationRecord>() else {
                continue;
            };
            let nodes = record.added_nodes();
            let added = (0..nodes.length())
                .filter_map(|i| nodes.get(i))
                .map(|node| self.handle(&node))
                .collect();
            converted.push(MutationRecord {
                target: None,
                added,
                removed: Vec::new(),
            });
        }
        converted
    }

    /// Handle of an event's current target, if it is a node
    pub fn event_target(&self, event: &web_sys::Event) -> Option<NodeId> {
        let target = event.current_target()?;
        let node = target.dyn_ref::<Node>()?;
        Some(self.handle(node))
    }

    /// Number of live handles
    pub fn handle_count(&self) -> usize {
        self.handles.borrow().live()
    }

    fn element(&self, id: NodeId) -> Option<Element> {
        self.node(id)?.dyn_into::<Element>().ok()
    }
}

impl Document for WebDocument {
    fn body(&self) -> Option<NodeId> {
        self.body
    }

    fn url(&self) -> Option<String> {
        self.document.url().ok()
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        let kind = match self.node(node)?.node_type() {
            Node::ELEMENT_NODE => NodeKind::Element,
            Node::TEXT_NODE => NodeKind::Text,
            Node::COMMENT_NODE => NodeKind::Comment,
            Node::DOCUMENT_NODE => NodeKind::Document,
            _ => NodeKind::Other,
        };
        Some(kind)
    }

    fn node_name(&self, node: NodeId) -> String {
        self.node(node).map(|n| n.node_name()).unwrap_or_default()
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.element(node).is_some_and(|el| el.class_list().contains(class))
    }

    fn set_class_name(&mut self, node: NodeId, class_name: &str) {
        if let Some(el) = self.element(node) {
            el.set_class_name(class_name);
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        self.node(node).and_then(|n| n.text_content()).unwrap_or_default()
    }

    fn set_text_content(&mut self, node: NodeId, text: &str) {
        if let Some(node) = self.node(node) {
            node.set_text_content(Some(text));
        }
    }

    fn set_style(&mut self, node: NodeId, css: &str) {
        if let Some(el) = self.element(node) {
            if let Err(e) = el.set_attribute("style", css) {
                warn!("set_style failed: {:?}", e);
            }
        }
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let Some(node) = self.node(node) else {
            return Vec::new();
        };
        let list = node.child_nodes();
        (0..list.length())
            .filter_map(|i| list.get(i))
            .map(|child| self.handle(&child))
            .collect()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.node(node)?.parent_node()?;
        Some(self.handle(&parent))
    }

    fn is_connected(&self, node: NodeId) -> bool {
        self.node(node).is_some_and(|n| n.is_connected())
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        let node: Node = self.document.create_text_node(text).into();
        self.handle(&node)
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        let node: Node = match self.document.create_element(tag) {
            Ok(el) => el.into(),
            Err(e) => {
                warn!("cannot create <{}>: {:?}", tag, e);
                self.document.create_document_fragment().into()
            }
        };
        self.handle(&node)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        match (self.node(parent), self.node(child)) {
            (Some(parent), Some(child)) => parent.append_child(&child).is_ok(),
            _ => false,
        }
    }

    fn replace_with(&mut self, old: NodeId, replacement: &[NodeId]) -> bool {
        let Some(old) = self.node(old) else {
            return false;
        };
        let Some(parent) = old.parent_node() else {
            return false;
        };

        let result = if replacement.is_empty() {
            parent.remove_child(&old)
        } else {
            let fragment = self.document.create_document_fragment();
            for &id in replacement {
                let Some(node) = self.node(id) else {
                    return false;
                };
                if fragment.append_child(&node).is_err() {
                    return false;
                }
            }
            parent.replace_child(&fragment, &old)
        };
        result.is_ok()
    }

    fn normalize(&mut self, node: NodeId) {
        if let Some(node) = self.node(node) {
            node.normalize();
        }
    }

    fn bounding_rect(&self, node: NodeId) -> Rect {
        self.element(node)
            .map(|el| {
                let rect = el.get_bounding_client_rect();
                Rect::new(rect.y(), rect.x(), rect.width(), rect.height())
            })
            .unwrap_or_default()
    }

    fn scroll_offset(&self) -> (f64, f64) {
        (
            self.window.scroll_x().unwrap_or(0.0),
            self.window.scroll_y().unwrap_or(0.0),
        )
    }

    fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        let collection = self.document.get_elements_by_class_name(class);
        (0..collection.length())
            .filter_map(|i| collection.item(i))
            .map(|el| self.handle(el.as_ref()))
            .collect()
    }

    fn listen_hover(&mut self, node: NodeId) {
        if let Some(el) = self.element(node) {
            let added = el
                .add_event_listener_with_callback(HOVER_ENTER, &self.on_hover_enter)
                .and_then(|_| el.add_event_listener_with_callback(HOVER_LEAVE, &self.on_hover_leave));
            if let Err(e) = added {
                warn!("could not attach hover listeners: {:?}", e);
            }
        }
    }

    fn unlisten_hover(&mut self, node: NodeId) {
        if let Some(el) = self.element(node) {
            let _ = el.remove_event_listener_with_callback(HOVER_ENTER, &self.on_hover_enter);
            let _ = el.remove_event_listener_with_callback(HOVER_LEAVE, &self.on_hover_leave);
        }
    }

    fn observe(&mut self) {
        let Some(body) = self.body.and_then(|id| self.node(id)) else {
            return;
        };
        let options = MutationObserverInit::new();
        options.set_child_list(true);
        options.set_subtree(true);
        match self.observer.observe_with_options(&body, &options) {
            Ok(()) => self.observing = true,
            Err(e) => warn!("observe failed: {:?}", e),
        }
    }

    fn disconnect(&mut self) {
        self.observer.take_records();
        self.observer.disconnect();
        self.observing = false;
    }

    fn is_observing(&self) -> bool {
        self.observing
    }

    fn retain(&mut self, node: NodeId) {
        if let Some(slot) = self.handles.get_mut().slot_mut(node) {
            slot.retained += 1;
        }
    }

    fn release(&mut self, node: NodeId) {
        let handles = self.handles.get_mut();
        if handles.slot(node).is_some_and(|slot| slot.retained == 0) {
            handles.drop_handle(node);
        }
    }

    fn forget(&mut self, node: NodeId) {
        let handles = self.handles.get_mut();
        let Some(slot) = handles.slot_mut(node) else {
            return;
        };
        slot.retained = slot.retained.saturating_sub(1);
        if slot.retained == 0 {
            handles.drop_handle(node);
        }
    }
}
