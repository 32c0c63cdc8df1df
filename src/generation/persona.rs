/// Capability surface for the answering persona. The generator depends only
/// on this trait; each persona kind implements it, so there is no runtime
/// inspection of caller context shapes.
pub trait Persona: Send + Sync {
    fn name(&self) -> &str;

    fn system_prompt(&self) -> &str;

    fn custom_instructions(&self) -> Option<&str> {
        None
    }
}

/// Default persona: a general assistant constrained to retrieved context.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralAssistant;

impl Persona for GeneralAssistant {
    fn name(&self) -> &str {
        "general-assistant"
    }

    fn system_prompt(&self) -> &str {
        "You are a helpful assistant for a talent platform. Answer strictly from the \
         provided context. When the context does not contain the answer, say so \
         explicitly instead of guessing."
    }
}

/// Stricter framing used when the caller operates in a structured interview
/// setting.
#[derive(Debug, Clone, Default)]
pub struct InterviewAssistant {
    pub custom_instructions: Option<String>,
}

impl InterviewAssistant {
    pub fn new(custom_instructions: Option<String>) -> Self {
        Self {
            custom_instructions,
        }
    }
}

impl Persona for InterviewAssistant {
    fn name(&self) -> &str {
        "interview-assistant"
    }

    fn system_prompt(&self) -> &str {
        "You are a structured interview assistant. Base every statement on the provided \
         candidate and role context; never invent qualifications, dates or employers. \
         Keep a neutral, professional tone and state plainly when the context is \
         insufficient to answer."
    }

    fn custom_instructions(&self) -> Option<&str> {
        self.custom_instructions.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personas_expose_the_same_surface() {
        let general: &dyn Persona = &GeneralAssistant;
        assert_eq!(general.name(), "general-assistant");
        assert!(general.custom_instructions().is_none());

        let interview = InterviewAssistant::new(Some("Ask one question at a time.".into()));
        let interview: &dyn Persona = &interview;
        assert_eq!(interview.name(), "interview-assistant");
        assert_eq!(
            interview.custom_instructions(),
            Some("Ask one question at a time.")
        );
        assert!(interview.system_prompt().contains("structured interview"));
    }
}
