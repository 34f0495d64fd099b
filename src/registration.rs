//! Term registration from a page selection
//!
//! The context menu hands over the selected text. The host shows the prompt
//! built here (pre-filled with the current definition) and passes the
//! answer back: no answer cancels, an empty answer deletes the term, anything
//! else is saved. The session picks the resulting store change up through
//! the normal local-namespace notification.

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dictionary::store::{KeyValueStore, Namespace};
use crate::dictionary::Dictionary;
use crate::error::{DictError, Result};

/// What to ask the user for a selected term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionPrompt {
    pub term: String,
    pub message: String,
    /// Current definition, if the term is already registered
    pub default_text: Option<String>,
}

impl DefinitionPrompt {
    /// Prompt for `selection`; `None` for an empty selection
    pub fn for_selection(selection: &str, dictionary: &Dictionary) -> Option<Self> {
        if selection.is_empty() {
            return None;
        }
        Some(Self {
            term: selection.to_string(),
            message: format!(
                "What is the definition of \"{}\" ?\n(Submit empty definition to delete word from dictionary)",
                selection
            ),
            default_text: dictionary.get(selection).map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationOutcome {
    /// Prompt dismissed; store untouched
    Cancelled,
    Removed,
    Saved,
}

/// Write the user's answer for `term` to the local namespace
pub fn register_definition<S>(store: &mut S, term: &str, response: Option<&str>) -> Result<RegistrationOutcome>
where
    S: KeyValueStore + ?Sized,
{
    if term.is_empty() {
        return Err(DictError::EmptyTerm);
    }
    let Some(definition) = response else {
        return Ok(RegistrationOutcome::Cancelled);
    };

    if definition.is_empty() {
        store.remove(Namespace::Local, &[term.to_string()])?;
        info!("removed {:?} from the dictionary", term);
        Ok(RegistrationOutcome::Removed)
    } else {
        let mut entry = IndexMap::new();
        entry.insert(term.to_string(), Value::String(definition.to_string()));
        store.set(Namespace::Local, entry)?;
        info!("saved definition for {:?}", term);
        Ok(RegistrationOutcome::Saved)
    }
}
