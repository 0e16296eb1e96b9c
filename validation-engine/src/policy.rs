//! Specialty policy: word budgets and review checklists.

use std::collections::HashMap;

use tracing::debug;

/// Review criteria ordered by importance; synthesized checklists take a
/// prefix of this list sized to the specialty's verbosity.
const BASE_CHECKS: &[&str] = &[
    "Clinical indication for the requested study is explicitly stated",
    "Dictation supports the medical necessity of the study",
    "Symptom duration or progression is documented",
    "Prior imaging or treatment for the same indication is referenced",
    "Patient-specific risk factors or comorbidities are noted",
    "The requested modality matches the clinical question",
    "Laterality and anatomical site are unambiguous",
    "Follow-up interval is justified by guideline or clinical change",
];

/// Resolves per-specialty verbosity budgets and review checklists.
///
/// Specialty names are matched after trimming and lowercasing; unregistered
/// specialties fall back to the configured default budget and a synthesized
/// checklist.
pub struct SpecialtyPolicyProvider {
    budgets: HashMap<String, u32>,
    checklists: HashMap<String, Vec<String>>,
    default_budget: u32,
}

impl SpecialtyPolicyProvider {
    pub fn new(default_budget: u32) -> Self {
        let mut provider = Self {
            budgets: HashMap::new(),
            checklists: HashMap::new(),
            default_budget: default_budget.max(1),
        };

        // Budgets tuned per referring specialty; terse for high-volume
        // primary care, verbose where orders carry complex staging context.
        provider.register_budget("Family Medicine", 29);
        provider.register_budget("Internal Medicine", 45);
        provider.register_budget("Emergency Medicine", 25);
        provider.register_budget("Cardiology", 60);
        provider.register_budget("Orthopedic Surgery", 35);
        provider.register_budget("Neurology", 75);
        provider.register_budget("Oncology", 90);
        provider.register_budget("Pediatrics", 40);

        provider.register_checklist(
            "Cardiology",
            vec![
                "Cardiac symptoms or functional class are described".to_string(),
                "Relevant prior cardiac testing and results are referenced".to_string(),
                "Indication aligns with the requested cardiac study".to_string(),
                "Risk factors (hypertension, diabetes, lipid status) are noted".to_string(),
                "Current cardiac medications are listed where relevant".to_string(),
                "The clinical question the study should answer is explicit".to_string(),
            ],
        );
        provider.register_checklist(
            "Oncology",
            vec![
                "Primary malignancy and stage are stated".to_string(),
                "Treatment phase (staging, response, surveillance) is identified".to_string(),
                "Date and findings of the comparison study are referenced".to_string(),
                "Protocol or guideline driving the interval is named".to_string(),
                "New symptoms or laboratory changes are documented".to_string(),
                "Contrast considerations (renal function, allergy) are addressed".to_string(),
                "The requested coverage area matches the disease distribution".to_string(),
                "Clinical trial participation is noted where applicable".to_string(),
            ],
        );

        provider
    }

    pub fn register_budget(&mut self, specialty: &str, budget: u32) {
        self.budgets
            .insert(Self::normalize(specialty), budget.max(1));
    }

    pub fn register_checklist(&mut self, specialty: &str, checks: Vec<String>) {
        self.checklists.insert(Self::normalize(specialty), checks);
    }

    /// Word budget for feedback to this specialty; configured default for
    /// unregistered names.
    pub fn resolve_word_budget(&self, specialty: &str) -> u32 {
        self.budgets
            .get(&Self::normalize(specialty))
            .copied()
            .unwrap_or(self.default_budget)
    }

    /// Registered checklist when present, otherwise a synthesized one whose
    /// length scales with the resolved budget.
    pub fn resolve_checklist(&self, specialty: &str) -> Vec<String> {
        if let Some(checks) = self.checklists.get(&Self::normalize(specialty)) {
            return checks.clone();
        }

        let budget = self.resolve_word_budget(specialty);
        let count = match budget {
            0..=25 => 3,
            26..=50 => 4,
            51..=90 => 6,
            _ => 8,
        };
        debug!(specialty = %specialty, budget, count, "Synthesizing review checklist");
        BASE_CHECKS
            .iter()
            .take(count)
            .map(|check| check.to_string())
            .collect()
    }

    /// Hard truncation to at most the specialty's budget in
    /// whitespace-delimited words. Within-budget text passes unchanged.
    pub fn enforce_word_budget(&self, text: &str, specialty: &str) -> String {
        let budget = self.resolve_word_budget(specialty) as usize;
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() <= budget {
            return text.to_string();
        }
        words
            .into_iter()
            .take(budget)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn normalize(specialty: &str) -> String {
        specialty.trim().to_lowercase()
    }
}
