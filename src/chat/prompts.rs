//! Fixed prompt text and canned replies.
//!
//! Everything user-visible lives here so behavior changes are reviewable in
//! one place. The assistant speaks Brazilian Portuguese.

/// Phrases that mean the user wants a human agent. Matched case-insensitively
/// anywhere in the raw question, before any retrieval or completion call.
pub const HUMAN_HANDOFF_KEYWORDS: &[&str] = &[
    "falar com humano",
    "falar com uma pessoa",
    "falar com atendente",
    "falar com um atendente",
    "quero falar com alguém",
    "preciso de um humano",
    "atendimento humano",
    "pessoa real",
    "atendente real",
    "contato humano",
    "suporte humano",
];

pub const HANDOFF_MESSAGE: &str = "Entendo que você prefere falar com um humano. \
Você pode entrar em contato com a nossa equipe de atendimento pelo WhatsApp. \
Estamos disponíveis de segunda a sexta, das 8h às 18h. \
Posso ajudar com mais alguma coisa?";

pub const NO_CONTEXT_MESSAGE: &str = "Não encontrei informações relevantes para \
responder à sua pergunta. Por favor, tente reformular ou forneça mais detalhes.";

pub fn is_human_handoff_request(question: &str) -> bool {
    let question_lower = question.to_lowercase();
    HUMAN_HANDOFF_KEYWORDS
        .iter()
        .any(|keyword| question_lower.contains(keyword))
}

/// System instruction for a single-batch answer. The rules are fixed: answer
/// only from the provided documents, admit when the information is absent,
/// stay concise, never fabricate, never cite sources to the end user.
pub fn system_prompt(recent_history: &str, context_text: &str) -> String {
    format!(
        "Você é Ada, uma assistente de IA da Ada Sistemas, especializada em \
responder perguntas com base em documentos.

Regras:
1. Use APENAS as informações fornecidas nos documentos para responder às perguntas.
2. Se a informação não estiver nos documentos, diga explicitamente que não pode \
responder com base no conteúdo disponível.
3. Seja concisa e direta em suas respostas.
4. Não invente informações ou faça suposições além do que está nos documentos.
5. Não cite as fontes dos documentos.
6. Mantenha um tom profissional e amigável.
7. Se o usuário pedir para falar com um humano ou atendente, informe que o \
atendimento está disponível de segunda a sexta, das 8h às 18h.

Histórico de conversa recente:
{recent_history}

Contexto dos documentos:
{context_text}
"
    )
}

pub fn user_prompt(question: &str) -> String {
    format!("Pergunta: {question}")
}

/// Prompt for the merge step when the context needed more than one batch.
pub fn synthesis_prompt(question: &str, partial_answers: &[String]) -> String {
    format!(
        "Você é Ada, uma assistente de IA da Ada Sistemas.

Você recebeu as seguintes respostas parciais para a pergunta: \"{question}\"

Respostas parciais:
{partials}

Por favor, sintetize essas respostas em uma única resposta coerente e concisa. \
Remova qualquer redundância e organize as informações de forma lógica.",
        partials = partial_answers.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handoff_detection_is_case_insensitive() {
        assert!(is_human_handoff_request("Quero FALAR COM ATENDENTE agora"));
        assert!(is_human_handoff_request(
            "Eu quero falar com um atendente, pode ajudar?"
        ));
        assert!(is_human_handoff_request("preciso de um humano"));
    }

    #[test]
    fn ordinary_questions_do_not_trigger_handoff() {
        assert!(!is_human_handoff_request("Qual o prazo de entrega?"));
        assert!(!is_human_handoff_request("Como categorizar uma transação?"));
        assert!(!is_human_handoff_request(""));
    }
}
