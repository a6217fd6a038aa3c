use serde::Deserialize;

/// An incoming chat frame. Two shapes are accepted:
/// `{"role": "user", "content": "..."}` (current clients) and
/// `{"question": "..."}` (legacy clients). Both may carry `top_k` and
/// `file_paths`.
#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    pub role: Option<String>,
    pub content: Option<String>,
    pub question: Option<String>,
    pub top_k: Option<usize>,
    #[serde(default)]
    pub file_paths: Vec<String>,
}

impl WsIncomingMessage {
    /// The question text, if this frame carries one.
    pub fn question(&self) -> Option<&str> {
        if self.role.as_deref() == Some("user") {
            if let Some(content) = self.content.as_deref() {
                if !content.is_empty() {
                    return Some(content);
                }
            }
        }
        self.question.as_deref().filter(|q| !q.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_frame_shape_is_parsed() {
        let msg: WsIncomingMessage =
            serde_json::from_str(r#"{"role": "user", "content": "Qual o prazo?", "top_k": 3}"#)
                .unwrap();
        assert_eq!(msg.question(), Some("Qual o prazo?"));
        assert_eq!(msg.top_k, Some(3));
    }

    #[test]
    fn legacy_frame_shape_is_parsed() {
        let msg: WsIncomingMessage =
            serde_json::from_str(r#"{"question": "Qual o prazo?", "file_paths": ["uploads/a"]}"#)
                .unwrap();
        assert_eq!(msg.question(), Some("Qual o prazo?"));
        assert_eq!(msg.file_paths, vec!["uploads/a".to_string()]);
    }

    #[test]
    fn frames_without_a_question_are_ignored() {
        let msg: WsIncomingMessage =
            serde_json::from_str(r#"{"role": "assistant", "content": "oi"}"#).unwrap();
        assert_eq!(msg.question(), None);

        let msg: WsIncomingMessage = serde_json::from_str(r#"{"role": "user"}"#).unwrap();
        assert_eq!(msg.question(), None);
    }
}
