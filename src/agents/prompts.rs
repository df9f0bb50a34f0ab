//! Instruction texts for each role and the conversation builders the
//! supervisor uses to address them.

use super::types::Plan;

pub const PLANNER_INSTRUCTION: &str = r#"You are a planning agent.
Decompose the user's goal into ordered, minimal, actionable steps.
Do not execute code. Do not write extensive code blocks.
Your output must be pure JSON with this structure:
{
  "steps": [
    "Step 1 description",
    "Step 2 description"
  ]
}"#;

pub const BUILDER_INSTRUCTION: &str = r#"You are a builder agent.
Your task is to implement the code based on the provided plan.
Output the full file content for every file you create or change.
Emit each file as a fenced code block whose info string is `language:path`.
Example:
```javascript:src/index.js
console.log("hello");
```"#;

pub const REVIEWER_INSTRUCTION: &str = r#"You are a code reviewer agent.
Review the provided code for logic errors, security vulnerabilities, and adherence to the plan.
If the code is good, output "PASS".
If the code has issues, output "FAIL" followed by a list of specific issues to fix."#;

pub const REFLECTOR_INSTRUCTION: &str = r#"You analyze failed or suboptimal attempts.

You decide:
1. What went wrong
2. Whether external knowledge is required
3. What specific information would help

Respond in strict JSON:
{
  "shouldResearch": boolean,
  "reason": string,
  "searchQueries": string[]
}"#;

pub const DISTILLER_INSTRUCTION: &str = r#"You convert research into durable operational knowledge.

Output:
- What to do differently next time
- Updated heuristics or prompts
- Constraints and caveats

No prose. No fluff."#;

pub const GUARDED_BUILDER_INSTRUCTION: &str = "You are Avon, a code generation agent operating in Safe Lane mode. \
Follow the prompt instructions exactly.";

/// Everything the Builder sees for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub goal: &'a str,
    pub plan: &'a Plan,
    /// Lessons distilled earlier in this run.
    pub distilled_wisdom: &'a str,
    /// Lessons carried over from earlier runs.
    pub prior_lessons: &'a [String],
    pub previous_artifact: Option<&'a str>,
}

pub fn build_prompt(ctx: &BuildContext<'_>) -> String {
    let mut prompt = format!("Goal: {}\nPlan:\n{}\n", ctx.goal, ctx.plan.text);

    if !ctx.prior_lessons.is_empty() {
        prompt.push_str("\n[PRIOR HEURISTICS]:\n");
        for lesson in ctx.prior_lessons {
            prompt.push_str(lesson);
            prompt.push('\n');
        }
    }

    if !ctx.distilled_wisdom.trim().is_empty() {
        prompt.push_str("\n[LEARNED DISTILLED KNOWLEDGE]:\n");
        prompt.push_str(ctx.distilled_wisdom.trim());
        prompt.push('\n');
    }

    prompt.push_str("\nPrevious Artifact (if any):\n");
    prompt.push_str(ctx.previous_artifact.unwrap_or("None"));
    prompt.push_str("\n\nGenerate the code now.");
    prompt
}

pub fn review_prompt(artifact: &str) -> String {
    format!("Review this code for correctness and security:\n{}", artifact)
}

pub fn reflection_prompt(artifact: &str, issues: &str) -> String {
    format!("Code:\n{}\n\nReview Issues:\n{}", artifact, issues)
}

pub fn distill_prompt(issues: &str, findings: &str) -> String {
    format!("Original Error:\n{}\n\nResearch Findings:\n{}", issues, findings)
}
