//! Prompt assembly for the LLM call.

use helpdesk_core::types::{ChatMessage, Message, Role};

/// System instructions, then prior turns, then the new question.
///
/// The knowledge and FAQ contexts are appended to the system message under
/// their own headings; empty contexts are left out.
pub fn build_messages(
    system_prompt: &str,
    knowledge_context: &str,
    faq_context: &str,
    history: &[ChatMessage],
    question: &str,
) -> Vec<Message> {
    let mut system = system_prompt.trim().to_string();
    if !knowledge_context.trim().is_empty() {
        system.push_str("\n\n## Knowledge base\n");
        system.push_str(knowledge_context.trim());
    }
    if !faq_context.trim().is_empty() {
        system.push_str("\n\n## Frequently asked questions\n");
        system.push_str(faq_context.trim());
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system));
    messages.extend(
        history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Message { role: m.role, content: m.content.clone() }),
    );
    messages.push(Message::user(question.trim()));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(id: i64, role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            id,
            conversation_id: "c1".into(),
            role,
            content: content.into(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_build_messages_layout() {
        let history = vec![turn(1, Role::User, "hi"), turn(2, Role::Assistant, "hello!")];
        let msgs = build_messages("Be helpful.", "### Pricing\n49 EUR", "Q: Fees?\nA: 49 EUR", &history, " how much? ");
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.starts_with("Be helpful.\n\n## Knowledge base\n### Pricing"));
        assert!(msgs[0].content.contains("## Frequently asked questions\nQ: Fees?"));
        assert_eq!(msgs[1].content, "hi");
        assert_eq!(msgs[2].role, Role::Assistant);
        assert_eq!(msgs[3], Message::user("how much?"));
    }

    #[test]
    fn test_empty_contexts_are_omitted() {
        let msgs = build_messages("Be helpful.", "  ", "", &[], "hi");
        assert_eq!(msgs[0].content, "Be helpful.");
        assert_eq!(msgs.len(), 2);
    }
}
