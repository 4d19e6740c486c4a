//! Prompt construction for the extraction service.
//!
//! The conversation is already de-identified by the time it reaches this
//! module; the prompts reinforce that no identifiers may be reintroduced.

/// System prompt sent with every extraction request.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "\
Extract clinical data from a de-identified conversation. Output MUST be valid JSON.

Rules:
- NEVER include patient names, dates, or identifiers
- Only extract explicitly stated facts
- Use 'N/A' for missing fields
- Return a single JSON object with: encounter_summary, vital_signs, diagnoses, \
medications, allergies, assessment_plan, overall_confidence, field_confidence, review_flags";

/// Build the user message for one masked conversation.
pub fn build_extraction_prompt(masked_conversation: &str) -> String {
    format!(
        "Extract JSON from this clinical conversation (de-identified):\n\n\
{masked_conversation}\n\n\
Return JSON with:\n\
- encounter_summary: {{chief_complaint, history_of_present_illness}}\n\
- vital_signs: {{blood_pressure, temperature, heart_rate, respiratory_rate, oxygen_saturation}}\n\
- diagnoses: [{{text, status: active|resolved|rule-out}}]\n\
- medications: [{{text, dosage, route, frequency, reason}}]\n\
- allergies: [{{substance, reaction, severity: mild|moderate|severe}}]\n\
- assessment_plan: string\n\
- overall_confidence: integer 1-100\n\
- field_confidence: {{field name -> integer 1-100}}\n\
- review_flags: [string]\n\n\
Only extract stated facts."
    )
}
