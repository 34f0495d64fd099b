//! JavaScript bindings
//!
//! `ContentSession` drives highlighting from the content script. The script
//! owns everything asynchronous: it reads storage when handed a refresh
//! ticket, arms `setTimeout` for a timer request, and forwards observer and
//! hover callbacks. `SettingsStore` backs the options page, popup and context
//! menu over a snapshot of both storage areas; the page persists whatever
//! `takeChanges` reports.

use indexmap::IndexMap;
use js_sys::{Array, Function};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::config::HighlighterConfig;
use crate::dictionary::store::{KeyValueStore, MemoryStore, Namespace, StorageChanges};
use crate::dictionary::RefreshTicket;
use crate::dom::web::WebDocument;
use crate::highlight::coordinator::TimerToken;
use crate::policy::Allowlist;
use crate::registration::{register_definition, DefinitionPrompt};
use crate::session::HighlightSession;
use crate::settings::{self, QuotaUsage, StatusMessage};

/// Plain objects rather than `Map`s, so results can go straight back into storage
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

fn from_js<T: serde::de::DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
    serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn ticket_to_js(ticket: Option<RefreshTicket>) -> Option<f64> {
    ticket.map(|t| t.0 as f64)
}

// =============================================================================
// Content script
// =============================================================================

#[wasm_bindgen]
pub struct ContentSession {
    inner: HighlightSession<WebDocument>,
}

#[wasm_bindgen]
impl ContentSession {
    /// `config` may be `undefined` or a partial configuration object
    #[wasm_bindgen(constructor)]
    pub fn new(
        config: JsValue,
        on_mutation: &Function,
        on_hover_enter: Function,
        on_hover_leave: Function,
    ) -> Result<ContentSession, JsValue> {
        let config: HighlighterConfig = if config.is_undefined() || config.is_null() {
            HighlighterConfig::default()
        } else {
            from_js(config)?
        };
        let doc = WebDocument::new(on_mutation, on_hover_enter, on_hover_leave)?;
        Ok(ContentSession {
            inner: HighlightSession::new(doc, config),
        })
    }

    /// Apply the sync area read at load; a returned ticket asks for the local area
    #[wasm_bindgen]
    pub fn initialize(&mut self, sync: JsValue) -> Result<Option<f64>, JsValue> {
        let sync: IndexMap<String, Value> = from_js(sync)?;
        Ok(ticket_to_js(self.inner.initialize(&sync)))
    }

    #[wasm_bindgen(js_name = updateAllowlist)]
    pub fn update_allowlist(&mut self, hosts: Vec<String>) -> Option<f64> {
        let allowlist: Allowlist = hosts.into_iter().collect();
        ticket_to_js(self.inner.update_allowlist(&allowlist))
    }

    /// New ticket after a failed local read
    #[wasm_bindgen(js_name = requestRefresh)]
    pub fn request_refresh(&mut self) -> Option<f64> {
        ticket_to_js(self.inner.request_refresh())
    }

    /// Deliver the local area read for `ticket`; returns scan stats or `undefined`
    #[wasm_bindgen(js_name = completeRefresh)]
    pub fn complete_refresh(&mut self, ticket: f64, values: JsValue) -> Result<JsValue, JsValue> {
        let values: IndexMap<String, Value> = from_js(values)?;
        match self.inner.complete_refresh(RefreshTicket(ticket as u64), values) {
            Some(scan) => to_js(&scan),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Forward a `storage.onChanged` notification
    #[wasm_bindgen(js_name = applyStorageChanges)]
    pub fn apply_storage_changes(&mut self, area: &str, changes: JsValue) -> Result<Option<f64>, JsValue> {
        let Some(namespace) = Namespace::from_area(area) else {
            return Ok(None);
        };
        let changes: StorageChanges = from_js(changes)?;
        Ok(ticket_to_js(self.inner.apply_storage_changes(namespace, &changes)))
    }

    /// Observer callback; returns `{ token, delayMs }` to (re)arm, or `undefined`
    #[wasm_bindgen(js_name = handleMutations)]
    pub fn handle_mutations(&mut self, records: &Array) -> Result<JsValue, JsValue> {
        let records = self.inner.document().convert_records(records);
        match self.inner.handle_mutations(&records) {
            Some(request) => to_js(&request),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(js_name = fireTimer)]
    pub fn fire_timer(&mut self, token: f64) -> Result<JsValue, JsValue> {
        match self.inner.on_timer(TimerToken(token as u64)) {
            Some(scan) => to_js(&scan),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    #[wasm_bindgen(js_name = pointerEnter)]
    pub fn pointer_enter(&mut self, event: &web_sys::Event) {
        if let Some(node) = self.inner.document().event_target(event) {
            self.inner.pointer_enter(node);
        }
    }

    #[wasm_bindgen(js_name = pointerLeave)]
    pub fn pointer_leave(&mut self, event: &web_sys::Event) {
        if let Some(node) = self.inner.document().event_target(event) {
            self.inner.pointer_leave(node);
        }
    }

    #[wasm_bindgen(js_name = isEnabled)]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    #[wasm_bindgen]
    pub fn teardown(&mut self) {
        self.inner.teardown();
    }

    #[wasm_bindgen]
    pub fn stats(&self) -> Result<JsValue, JsValue> {
        to_js(self.inner.stats())
    }

    #[wasm_bindgen(js_name = handleCount)]
    pub fn handle_count(&self) -> usize {
        self.inner.document().handle_count()
    }
}

// =============================================================================
// Options page, popup and context menu
// =============================================================================

#[derive(Serialize)]
struct AreaChanges<'a> {
    area: &'a str,
    changes: StorageChanges,
}

#[wasm_bindgen]
pub struct SettingsStore {
    store: MemoryStore,
}

#[wasm_bindgen]
impl SettingsStore {
    /// Snapshot of both areas as read by the page
    #[wasm_bindgen(constructor)]
    pub fn new(sync: JsValue, local: JsValue) -> Result<SettingsStore, JsValue> {
        let mut store = MemoryStore::new();
        for (namespace, values) in [(Namespace::Sync, sync), (Namespace::Local, local)] {
            if values.is_undefined() || values.is_null() {
                continue;
            }
            let values: IndexMap<String, Value> = from_js(values)?;
            store.set(namespace, values).map_err(|e| JsValue::from_str(&e.to_string()))?;
        }
        store.take_notifications();
        Ok(SettingsStore { store })
    }

    /// Writes since the last call, as `[{ area, changes }]`
    #[wasm_bindgen(js_name = takeChanges)]
    pub fn take_changes(&mut self) -> Result<JsValue, JsValue> {
        let batches: Vec<AreaChanges> = self
            .store
            .take_notifications()
            .into_iter()
            .map(|(namespace, changes)| AreaChanges {
                area: namespace.as_str(),
                changes,
            })
            .collect();
        to_js(&batches)
    }

    #[wasm_bindgen(js_name = dictionaryJson)]
    pub fn dictionary_json(&self) -> Result<String, JsValue> {
        settings::dictionary_json(&self.store).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = saveDictionary)]
    pub fn save_dictionary(&mut self, text: &str) -> Result<JsValue, JsValue> {
        to_js(&StatusMessage::from_result(&settings::save_dictionary_json(&mut self.store, text)))
    }

    #[wasm_bindgen(js_name = clearDictionary)]
    pub fn clear_dictionary(&mut self) -> Result<JsValue, JsValue> {
        to_js(&StatusMessage::from_result(&settings::clear_dictionary(&mut self.store)))
    }

    #[wasm_bindgen(js_name = allowlistJson)]
    pub fn allowlist_json(&self) -> Result<String, JsValue> {
        settings::allowlist_json(&self.store).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = saveAllowlist)]
    pub fn save_allowlist(&mut self, text: &str) -> Result<JsValue, JsValue> {
        to_js(&StatusMessage::from_result(&settings::save_allowlist_json(&mut self.store, text)))
    }

    #[wasm_bindgen(js_name = clearAllowlist)]
    pub fn clear_allowlist(&mut self) -> Result<JsValue, JsValue> {
        to_js(&StatusMessage::from_result(&settings::clear_allowlist(&mut self.store)))
    }

    /// Popup toggle; `undefined` for pages that cannot be enabled
    #[wasm_bindgen(js_name = toggleSite)]
    pub fn toggle_site(&mut self, url: &str) -> Result<Option<bool>, JsValue> {
        settings::toggle_site(&mut self.store, url).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = highlightStyle)]
    pub fn highlight_style(&self) -> Result<Option<String>, JsValue> {
        settings::highlight_style(&self.store).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(js_name = setHighlightStyle)]
    pub fn set_highlight_style(&mut self, style: &str) -> Result<JsValue, JsValue> {
        to_js(&StatusMessage::from_result(&settings::set_highlight_style(&mut self.store, style)))
    }

    /// Prompt for a context-menu selection; `undefined` for an empty selection
    #[wasm_bindgen(js_name = definitionPrompt)]
    pub fn definition_prompt(&self, selection: &str) -> Result<JsValue, JsValue> {
        let values = self
            .store
            .get(Namespace::Local, None)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let dictionary = crate::dictionary::Dictionary::from_values(values);
        match DefinitionPrompt::for_selection(selection, &dictionary) {
            Some(prompt) => to_js(&prompt),
            None => Ok(JsValue::UNDEFINED),
        }
    }

    /// Store the prompt answer (`null` when the prompt was dismissed)
    #[wasm_bindgen(js_name = registerDefinition)]
    pub fn register_definition(&mut self, term: &str, response: Option<String>) -> Result<JsValue, JsValue> {
        let outcome = register_definition(&mut self.store, term, response.as_deref())
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&outcome)
    }

    #[wasm_bindgen(js_name = dictionaryQuota)]
    pub fn dictionary_quota(&self) -> Result<JsValue, JsValue> {
        let usage = QuotaUsage::dictionary(&self.store).map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&QuotaReport::from(usage))
    }

    #[wasm_bindgen(js_name = allowlistQuota)]
    pub fn allowlist_quota(&self) -> Result<JsValue, JsValue> {
        let usage = QuotaUsage::allowlist(&self.store).map_err(|e| JsValue::from_str(&e.to_string()))?;
        to_js(&QuotaReport::from(usage))
    }
}

/// Quota usage as the settings page renders it
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuotaReport {
    #[serde(flatten)]
    usage: QuotaUsage,
    level: settings::QuotaLevel,
    percent: String,
}

impl From<QuotaUsage> for QuotaReport {
    fn from(usage: QuotaUsage) -> Self {
        Self {
            level: usage.level(),
            percent: usage.percent_text(),
            usage,
        }
    }
}
