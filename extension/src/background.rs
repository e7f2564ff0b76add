use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::messages::{ExtensionMessage, RewriteResponseMessage};
use crate::network::RewriteClient;

pub const CONTEXT_MENU_ID: &str = "rewrite-selection";
pub const CONTEXT_MENU_TITLE: &str = "Rewrite selection with AI";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMenuItem {
    pub id: &'static str,
    pub title: &'static str,
    pub contexts: Vec<&'static str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMenuClick {
    pub menu_item_id: String,
    #[serde(default)]
    pub selection_text: Option<String>,
    #[serde(default)]
    pub tab_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabMessage {
    pub tab_id: u32,
    pub message: ExtensionMessage,
}

/// Background context: answers rewrite requests from content scripts and
/// owns the context-menu entry.
pub struct Background {
    client: RewriteClient,
}

impl Background {
    pub fn new(client: RewriteClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RewriteClient {
        &self.client
    }

    /// Menu entry registered when the extension is installed.
    pub fn context_menu_item() -> ContextMenuItem {
        ContextMenuItem {
            id: CONTEXT_MENU_ID,
            title: CONTEXT_MENU_TITLE,
            contexts: vec!["selection"],
        }
    }

    /// Turns a click on the menu entry into an open-popup message for the tab.
    pub fn handle_context_menu_click(&self, click: &ContextMenuClick) -> Option<TabMessage> {
        if click.menu_item_id != CONTEXT_MENU_ID {
            return None;
        }

        let tab_id = click.tab_id?;
        let text = click
            .selection_text
            .as_deref()
            .filter(|text| !text.is_empty())?;

        debug!(tab_id, "context menu requested rewrite popup");
        Some(TabMessage {
            tab_id,
            message: ExtensionMessage::OpenRewritePopup {
                text: text.to_string(),
            },
        })
    }

    /// Returns `None` for messages the background does not answer.
    pub async fn handle_message(&self, message: ExtensionMessage) -> Option<RewriteResponseMessage> {
        match message {
            ExtensionMessage::RequestRewrite { text, mode } => {
                let response = match self.client.rewrite(&text, mode).await {
                    Ok(rewritten) => RewriteResponseMessage::success(rewritten),
                    Err(err) => {
                        warn!(%mode, "rewrite request failed: {err}");
                        RewriteResponseMessage::failure(err.to_string())
                    }
                };
                Some(response)
            }
            ExtensionMessage::OpenRewritePopup { .. } => None,
        }
    }
}
