use serde::{Deserialize, Serialize};

use crate::error::{InquestError, Result};

/// The finalized statement of what to research. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBrief {
    /// Refined research goal
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
}

impl ResearchBrief {
    /// Create a brief with only a goal
    ///
    /// # Errors
    ///
    /// Returns `InputValidation` if the goal is empty.
    pub fn new(goal: impl Into<String>) -> Result<Self> {
        let brief = Self {
            goal: goal.into().trim().to_string(),
            scope: None,
            timeframe: None,
            entities: Vec::new(),
        };
        brief.validate()?;
        Ok(brief)
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = non_empty(scope.into());
        self
    }

    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = non_empty(timeframe.into());
        self
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities
            .into_iter()
            .filter_map(non_empty)
            .collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.goal.trim().is_empty() {
            return Err(InquestError::InputValidation(
                "research brief is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Short topic line used for report titles and file names
    pub fn topic(&self) -> &str {
        let goal = self.goal.trim();
        let end = [goal.find('\n'), goal.find(". ")]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(goal.len());
        goal[..end].trim().trim_end_matches('.')
    }

    /// Brief as prompt text
    pub fn render(&self) -> String {
        let mut out = self.goal.clone();
        if let Some(ref scope) = self.scope {
            out.push_str("\nScope: ");
            out.push_str(scope);
        }
        if let Some(ref timeframe) = self.timeframe {
            out.push_str("\nTimeframe: ");
            out.push_str(timeframe);
        }
        if !self.entities.is_empty() {
            out.push_str("\nEntities: ");
            out.push_str(&self.entities.join(", "));
        }
        out
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_brief_rejected() {
        assert!(ResearchBrief::new("  ").is_err());
    }

    #[test]
    fn test_topic_is_first_sentence() {
        let brief = ResearchBrief::new("Survey quantum computing hardware advances. Focus on 2023.")
            .unwrap();
        assert_eq!(brief.topic(), "Survey quantum computing hardware advances");
    }

    #[test]
    fn test_render_includes_constraints() {
        let brief = ResearchBrief::new("Battery chemistry")
            .unwrap()
            .with_scope("grid storage")
            .with_timeframe("")
            .with_entities(vec!["CATL".into(), " ".into()]);

        let text = brief.render();
        assert!(text.contains("Scope: grid storage"));
        assert!(!text.contains("Timeframe"));
        assert!(text.contains("Entities: CATL"));
    }
}
