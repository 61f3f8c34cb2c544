//! In-memory conversation log: an append-only message list per
//! conversation, keyed by conversation id and scoped to a user.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{ChatMessage, ConversationSummary, StoredMessage};

struct Conversation {
    user_id: String,
    title: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    archived: bool,
    messages: Vec<StoredMessage>,
}

impl Conversation {
    fn summary(&self, id: &str) -> ConversationSummary {
        ConversationSummary {
            id: id.to_string(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            archived: self.archived,
        }
    }
}

#[derive(Default)]
pub struct ChatStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_conversation(&self, user_id: &str, title: Option<String>) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.conversations.write().insert(
            id.clone(),
            Conversation {
                user_id: user_id.to_string(),
                title,
                created_at: now,
                updated_at: now,
                archived: false,
                messages: Vec::new(),
            },
        );
        id
    }

    /// The user's active conversations, most recently updated first.
    pub fn list_conversations(&self, user_id: &str) -> Vec<ConversationSummary> {
        let conversations = self.conversations.read();
        let mut list: Vec<ConversationSummary> = conversations
            .iter()
            .filter(|(_, c)| c.user_id == user_id && !c.archived)
            .map(|(id, c)| c.summary(id))
            .collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    pub fn get_conversation(&self, user_id: &str, conversation_id: &str) -> Option<ConversationSummary> {
        self.conversations
            .read()
            .get(conversation_id)
            .filter(|c| c.user_id == user_id)
            .map(|c| c.summary(conversation_id))
    }

    /// Returns false if the conversation does not exist for this user.
    pub fn rename_conversation(&self, user_id: &str, conversation_id: &str, title: &str) -> bool {
        self.update(user_id, conversation_id, |c| c.title = Some(title.to_string()))
    }

    pub fn archive_conversation(&self, user_id: &str, conversation_id: &str) -> bool {
        self.update(user_id, conversation_id, |c| c.archived = true)
    }

    /// Append a message and bump the conversation's `updated_at`.
    /// Returns the message id, or None if the conversation is unknown.
    pub fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: &str,
        content: &str,
    ) -> Option<String> {
        let id = Uuid::new_v4().to_string();
        let appended = self.update(user_id, conversation_id, |c| {
            c.messages.push(StoredMessage {
                id: id.clone(),
                role: role.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            });
        });
        appended.then_some(id)
    }

    /// Messages in the order they were appended.
    pub fn get_messages(&self, user_id: &str, conversation_id: &str) -> Vec<StoredMessage> {
        self.conversations
            .read()
            .get(conversation_id)
            .filter(|c| c.user_id == user_id)
            .map(|c| c.messages.clone())
            .unwrap_or_default()
    }

    pub fn chat_history(&self, user_id: &str, conversation_id: &str) -> Vec<ChatMessage> {
        self.get_messages(user_id, conversation_id)
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
            })
            .collect()
    }

    /// Return `conversation_id` if it names an active conversation of this
    /// user, otherwise a freshly created one.
    pub fn ensure_conversation(&self, user_id: &str, conversation_id: Option<&str>) -> String {
        if let Some(id) = conversation_id {
            if self
                .get_conversation(user_id, id)
                .is_some_and(|c| !c.archived)
            {
                return id.to_string();
            }
        }
        self.create_conversation(user_id, None)
    }

    fn update<F>(&self, user_id: &str, conversation_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Conversation),
    {
        let mut conversations = self.conversations.write();
        match conversations.get_mut(conversation_id) {
            Some(c) if c.user_id == user_id => {
                f(c);
                c.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_list() {
        let store = ChatStore::new();
        let a = store.create_conversation("u1", None);
        let b = store.create_conversation("u1", Some("titled".into()));
        store.create_conversation("u2", None);

        let list = store.list_conversations("u1");
        assert_eq!(list.len(), 2);
        assert!(list.iter().any(|c| c.id == a));
        assert!(list.iter().any(|c| c.id == b && c.title.as_deref() == Some("titled")));
    }

    #[test]
    fn test_append_orders_messages_and_bumps_conversation() {
        let store = ChatStore::new();
        let old = store.create_conversation("u1", None);
        let new = store.create_conversation("u1", None);
        std::thread::sleep(std::time::Duration::from_millis(2));

        store.append_message("u1", &old, "user", "first").unwrap();
        store.append_message("u1", &old, "assistant", "second").unwrap();

        let messages = store.get_messages("u1", &old);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].role, "assistant");

        let list = store.list_conversations("u1");
        assert_eq!(list[0].id, old);
        assert_eq!(list[1].id, new);
    }

    #[test]
    fn test_conversations_are_scoped_to_user() {
        let store = ChatStore::new();
        let id = store.create_conversation("owner", None);
        assert!(store.append_message("intruder", &id, "user", "hi").is_none());
        assert!(store.get_messages("intruder", &id).is_empty());
        assert!(store.get_conversation("intruder", &id).is_none());
        assert!(!store.rename_conversation("intruder", &id, "mine"));
    }

    #[test]
    fn test_ensure_conversation_reuses_or_creates() {
        let store = ChatStore::new();
        let id = store.create_conversation("u1", None);
        assert_eq!(store.ensure_conversation("u1", Some(&id)), id);

        let other_user = store.ensure_conversation("u2", Some(&id));
        assert_ne!(other_user, id);

        let fresh = store.ensure_conversation("u1", None);
        assert_ne!(fresh, id);

        store.archive_conversation("u1", &id);
        assert_ne!(store.ensure_conversation("u1", Some(&id)), id);
    }

    #[test]
    fn test_archived_hidden_from_list() {
        let store = ChatStore::new();
        let id = store.create_conversation("u1", None);
        assert!(store.archive_conversation("u1", &id));
        assert!(store.list_conversations("u1").is_empty());
        assert!(store.get_conversation("u1", &id).unwrap().archived);
    }

    #[test]
    fn test_rename_and_history() {
        let store = ChatStore::new();
        let id = store.create_conversation("u1", None);
        assert!(store.rename_conversation("u1", &id, "Trip to Paris"));
        store.append_message("u1", &id, "user", "hello");
        assert_eq!(
            store.get_conversation("u1", &id).unwrap().title.as_deref(),
            Some("Trip to Paris")
        );
        assert_eq!(
            store.chat_history("u1", &id),
            vec![ChatMessage {
                role: "user".into(),
                content: "hello".into()
            }]
        );
    }
}
