use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::preferences::Preferences;
use crate::analysis::validate::{RichnessViolation, WeeklySchema};

pub const MAX_CONTEXT_ENTRIES: usize = 6;
pub const CONTEXT_ENTRY_CHARS: usize = 180;

pub const JSON_REPAIR_INSTRUCTION: &str = "Your last output was not valid JSON. Return ONLY valid JSON matching the schema exactly. No markdown. No extra keys.";

pub const DESCRIBE_SKIN_PROMPT: &str = r#"Describe ONLY observable facial skin features from the image.

INSTRUCTIONS:
- Focus on skin only; avoid identity/attractiveness.
- Do NOT diagnose medical conditions.
- Be precise, neutral, and uncertainty-aware.

INCLUDE:
1) Findings by facial region (forehead, cheeks, nose/T-zone, jaw/chin, under-eyes).
2) Lesion types if present (comedones, papules, pustules, cyst-like bumps, marks).
3) Redness/erythema, hyperpigmentation, texture irregularities, pore visibility.
4) Oil/shine vs dryness/dehydration cues.
5) Relative severity (mild / moderate / pronounced).
6) Symmetry or clustering patterns.
7) Image quality notes affecting certainty (lighting, blur, angle).

EXCLUDE:
- Causes or diagnoses
- Treatment advice
- Attractiveness judgments

FORMAT:
Return short bullet-style sentences or a concise paragraph describing what is visible and where.
If something is not clearly visible, explicitly say that."#;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const ROLE_SECTION: &str = r#"You are a cautious skincare assistant specializing in Korean skincare routines.

ROLE + STYLE:
- Be practical and specific (step order, frequency, amount, when to stop).
- Avoid moralizing or attractiveness comments.
- Do NOT diagnose diseases.
- If the photo is unclear, say so and reduce confidence, but still provide a safe minimal routine."#;

const EVIDENCE_SECTION: &str = r#"EVIDENCE RULE:
For each concern, include specific visible evidence from the photo (e.g., "clustered red papules on cheeks", "shine in T-zone", "visible post-acne marks on jaw").
If lighting/angle obstructs, state that."#;

const SCHEMA_HEAD: &str = r#"{
  "skinType": { "type": "Oily | Dry | Combination | Normal | Acne-prone | Sensitive-leaning | Oily / Acne-prone | Combination / Acne-prone", "confidence": 0 },
  "concerns": [{"name": "...", "severity": "Mild|Moderate|Severe", "confidence": 0, "evidence": "..."}],
  "ingredients": [{"ingredient": "...", "reason": "...", "cautions": ["..."]}],
  "products": [{"name": "...", "brand": "...", "category": "Cleanser|Toner|Essence|Serum|Moisturizer|Sunscreen|Spot treatment|Mask", "why": "...", "howToUse": "...", "cautions": ["..."], "tags": ["..."]}],
  "routine": {
    "AM": ["..."],
    "PM": ["..."],
"#;

const SCHEMA_TAIL: &str = r#"  },
  "conflicts": [{"ingredients": ["...","..."], "warning": "..."}],
  "disclaimers": ["..."],
  "timestamp": "ISO-8601"
}"#;

const LABELED_WEEKLY_SCHEMA: &str = r#"    "weekly": [
      "Daily base (AM): ...",
      "Daily base (PM): ...",
      "Active cycle (Mon–Sun): Mon ... | Tue ... | Wed ... | Thu ... | Fri ... | Sat ... | Sun ...",
      "Ramp-up (4 weeks): Weeks 1–2 ...; Weeks 3–4 ...; Maintenance ...",
      "Rules: ..."
    ]
"#;

const MINIMAL_WEEKLY_SCHEMA: &str = r#"    "weekly": ["...", "..."]
"#;

pub fn normalize_context_entry(entry: &str) -> String {
    let collapsed = WHITESPACE_RUN.replace_all(entry.trim(), " ");
    collapsed.chars().take(CONTEXT_ENTRY_CHARS).collect()
}

fn context_section(retrieved_context: &[String]) -> Option<String> {
    let entries = retrieved_context
        .iter()
        .take(MAX_CONTEXT_ENTRIES)
        .map(|entry| normalize_context_entry(entry))
        .filter(|entry| !entry.is_empty())
        .collect::<Vec<_>>();
    if entries.is_empty() {
        return None;
    }
    Some(format!(
        "OPTIONAL CONTEXT (do NOT quote; use only as weak prior signals, never as authoritative findings):\n- {}",
        entries.join("\n- ")
    ))
}

fn preferences_section(prefs: &Preferences) -> String {
    let mut lines = vec![
        "USER PREFERENCES (must be respected):".to_string(),
        format!("- goals: \"{}\"", prefs.goals),
    ];
    if let Some(age) = prefs.age {
        lines.push(format!(
            "- age: {age} (tailor intensity and product texture to this age)"
        ));
    }
    if let Some(focus) = prefs.value_focus {
        lines.push(format!(
            "- valueFocus: \"{}\" ({})",
            focus.as_str(),
            focus.guidance()
        ));
    }
    lines.push(format!(
        "- fragranceFree: {} (if true, prioritize fragrance-free; if unsure, say \"may contain fragrance\")",
        prefs.fragrance_free
    ));
    lines.push(format!(
        "- pregnancySafe: {} (if true, avoid retinoids; choose safer alternatives when uncertain)",
        prefs.pregnancy_safe
    ));
    lines.push(format!(
        "- sensitiveMode: {} (if true, simplify routine, fewer actives, slower ramp)",
        prefs.sensitive_mode
    ));
    lines.join("\n")
}

fn weekly_rule(schema: WeeklySchema) -> &'static str {
    match schema {
        WeeklySchema::Labeled => {
            r#"4) routine.weekly is REQUIRED and must include ALL of the following (use these exact prefixes):
   - "Daily base (AM): ..." (a one-line base plan used every morning)
   - "Daily base (PM): ..." (a one-line base plan used every night before/after actives)
   - "Active cycle (Mon–Sun): Mon ... | Tue ... | Wed ... | Thu ... | Fri ... | Sat ... | Sun ..."
     * Each day must be labeled as either a Treatment night (which active) or Barrier night (soothing/recovery).
     * If pregnancySafe=true, do NOT include retinoids in the cycle.
     * If sensitiveMode=true, start with 1–2 treatment nights/week and more barrier nights.
   - "Ramp-up (4 weeks): Weeks 1–2 ...; Weeks 3–4 ...; Maintenance ..."
   - "Rules: ..." (when to pause, patch test notes, irritation guidance)"#
        }
        WeeklySchema::Minimal => {
            r#"4) routine.weekly is REQUIRED: at least 2 entries describing weekly treatments (exfoliation, masks, active nights) with frequency.
     * If pregnancySafe=true, do NOT include retinoids.
     * If sensitiveMode=true, keep treatments to 1–2 per week."#
        }
    }
}

fn weekly_check(schema: WeeklySchema) -> &'static str {
    match schema {
        WeeklySchema::Labeled => {
            "- routine.weekly includes Daily base + Active cycle + Ramp-up + Rules"
        }
        WeeklySchema::Minimal => "- routine.weekly has at least 2 entries",
    }
}

fn quality_section(schema: WeeklySchema) -> String {
    format!(
        r#"QUALITY RULES (IMPORTANT):
1) Routine MUST feel tailored to observed issues. Do NOT output generic routines.
2) AM routine must have 5–7 steps. PM routine must have 6–9 steps.
   - If sensitiveMode=true, AM may be 4–6 and PM may be 5–8, but still specific.
3) Every routine step MUST include:
   - a CATEGORY (cleanser/toner/serum/moisturizer/sunscreen/etc),
   - a FREQUENCY (daily / 2x-week / etc),
   - and a SHORT CONDITION (e.g., "skip if stinging", "only on non-retinoid nights").
{}
5) Products: recommend by SLOTS so it's actionable (don't list random items).
   Must include at least:
   - Cleanser (gentle) 1–2 options
   - Moisturizer 1–2 options (optionally a lighter gel if oily/acne-prone)
   - Sunscreen 1–2 options
   - Targeted treatment/serum aligned to top concern 1–2 options
   Optional: spot treatment / mask
6) Do not invent brands. Prefer widely available K-beauty brands. If uncertain, choose safe mainstream options.
7) Conflicts must include concrete "do not combine same night" warnings relevant to ingredients you recommended."#,
        weekly_rule(schema)
    )
}

pub fn build_prompt(
    prefs: &Preferences,
    retrieved_context: &[String],
    schema: WeeklySchema,
) -> String {
    let weekly_schema = match schema {
        WeeklySchema::Labeled => LABELED_WEEKLY_SCHEMA,
        WeeklySchema::Minimal => MINIMAL_WEEKLY_SCHEMA,
    };

    let mut sections = vec![ROLE_SECTION.to_string(), preferences_section(prefs)];
    if let Some(context) = context_section(retrieved_context) {
        sections.push(context);
    }
    sections.push(
        "TASK:\nAnalyze ONLY visible facial skin characteristics and produce a structured JSON report matching the exact schema below.\nOutput MUST be VALID JSON ONLY. No markdown. No commentary."
            .to_string(),
    );
    sections.push(quality_section(schema));
    sections.push(EVIDENCE_SECTION.to_string());
    sections.push(format!(
        "Return JSON ONLY matching this exact shape:\n\n{SCHEMA_HEAD}{weekly_schema}{SCHEMA_TAIL}"
    ));
    sections.push(format!(
        "FINAL CHECK BEFORE YOU ANSWER:\n- Valid JSON only\n- AM length 5–7 and PM length 6–9 (unless sensitiveMode allows shorter)\n{}\n- at least 4 product slots covered",
        weekly_check(schema)
    ));

    sections.join("\n\n")
}

pub fn richness_repair_instruction(violations: &[RichnessViolation], schema: WeeklySchema) -> String {
    let reasons = violations
        .iter()
        .map(|violation| violation.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    let weekly = match schema {
        WeeklySchema::Labeled => "ensure routine.weekly includes: Daily base (AM), Daily base (PM), Active cycle (Mon–Sun) with treatment vs barrier nights, Ramp-up (4 weeks), and Rules",
        WeeklySchema::Minimal => "ensure routine.weekly lists the weekly treatments with their frequency",
    };
    format!(
        "Your last output was too generic/short ({reasons}). Expand with specific step frequencies and conditions, and {weekly}. Recommend products by slot. Return valid JSON only."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs() -> Preferences {
        Preferences {
            goals: "acne + dark spots".to_string(),
            pregnancy_safe: true,
            ..Preferences::default()
        }
    }

    #[test]
    fn prompt_is_deterministic_and_embeds_preferences() {
        let first = build_prompt(&prefs(), &[], WeeklySchema::Minimal);
        let second = build_prompt(&prefs(), &[], WeeklySchema::Minimal);
        assert_eq!(first, second);
        assert!(first.contains("- goals: \"acne + dark spots\""));
        assert!(first.contains("- pregnancySafe: true"));
        assert!(first.contains("- fragranceFree: false"));
        assert!(!first.contains("OPTIONAL CONTEXT"));
        assert!(!first.contains("- age:"));
    }

    #[test]
    fn labeled_schema_requests_labeled_sections() {
        let prompt = build_prompt(&prefs(), &[], WeeklySchema::Labeled);
        assert!(prompt.contains("Daily base (AM): ..."));
        assert!(prompt.contains("Ramp-up (4 weeks)"));
        let minimal = build_prompt(&prefs(), &[], WeeklySchema::Minimal);
        assert!(!minimal.contains("Daily base (AM): ..."));
    }

    #[test]
    fn context_is_capped_normalized_and_truncated() {
        let mut context = vec!["  SkinType:\n\tOily.   Concerns:  PIE(Mild) ".to_string()];
        context.push("x".repeat(500));
        for index in 0..10 {
            context.push(format!("entry {index}"));
        }
        let prompt = build_prompt(&prefs(), &context, WeeklySchema::Minimal);
        assert!(prompt.contains("weak prior signals"));
        assert!(prompt.contains("- SkinType: Oily. Concerns: PIE(Mild)\n"));
        assert!(prompt.contains(&format!("- {}\n", "x".repeat(CONTEXT_ENTRY_CHARS))));
        assert!(!prompt.contains(&"x".repeat(CONTEXT_ENTRY_CHARS + 1)));
        assert!(prompt.contains("- entry 3"));
        assert!(!prompt.contains("- entry 4"));
    }

    #[test]
    fn blank_context_entries_produce_no_section() {
        let prompt = build_prompt(&prefs(), &["   ".to_string()], WeeklySchema::Minimal);
        assert!(!prompt.contains("OPTIONAL CONTEXT"));
    }

    #[test]
    fn richness_repair_names_each_violation() {
        let text = richness_repair_instruction(
            &[
                RichnessViolation::AmTooShort { found: 3, min: 4 },
                RichnessViolation::TooFewProducts { found: 1, min: 4 },
            ],
            WeeklySchema::Minimal,
        );
        assert!(text.contains("AM routine has 3 steps"));
        assert!(text.contains("1 products"));
        assert!(text.ends_with("Return valid JSON only."));
    }
}
