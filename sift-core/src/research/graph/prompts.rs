//! Prompt templates of the graph reader.
//!
//! Templates are rendered with Handlebars in non-strict mode with HTML
//! escaping turned off, since the output goes to a model and not a browser.

use crate::error::ParseError;
use handlebars::Handlebars;
use serde::Serialize;

pub const PLANNER_SYSTEM_PROMPT: &str = "You are a research planner. Output valid JSON only.";
pub const EXTRACTOR_SYSTEM_PROMPT: &str = "You are a research compressor. Output valid JSON only.";
pub const NAVIGATOR_SYSTEM_PROMPT: &str = "You are a research navigator. Output valid JSON only.";
pub const VALIDATOR_SYSTEM_PROMPT: &str = "You are a research validator. Output valid JSON only.";
pub const CONDENSER_SYSTEM_PROMPT: &str =
    "You are a research condenser. Merge facts into short plain-text notes without adding anything.";
pub const FINALIZER_SYSTEM_PROMPT: &str =
    "You synthesize a concise answer grounded only in the notebook facts.";

pub const PLAN: &str = "plan";
pub const INIT_NODES: &str = "init_nodes";
pub const EXTRACT: &str = "extract";
pub const EXTRACT_TEXT: &str = "extract_text";
pub const NEIGHBORS: &str = "neighbors";
pub const ANSWER_CHECK: &str = "answer_check";
pub const CONDENSE: &str = "condense";

const PLAN_TEMPLATE: &str = r#"You are an expert researcher.
User Question: {{question}}

Create a "Rational Plan" to answer this question.
1. State the research goal in one sentence. Leave out any instructions about output format.
2. Break the question down into logical steps.
3. Identify the specific Key Elements (names, places, concepts) we need to find.
4. Keep it concise.

Output JSON format:
{
    "research_goal": "what we must find out",
    "strategy": ["step 1", "step 2"],
    "key_elements": ["Entity A", "Entity B"]
}
"#;

const INIT_NODES_TEMPLATE: &str = r#"Research Goal: {{plan.research_goal}}
Plan:
{{#each plan.strategy}}- {{this}}
{{/each}}
Key Elements:
{{#each plan.key_elements}}- {{this}}
{{/each}}

Generate 3-5 specific Search Queries (Nodes) to start our research.
They should be the queries most likely to yield direct "Atomic Facts" about the key elements.

Output JSON format:
["query 1", "query 2", "query 3"]
"#;

const EXTRACT_TEMPLATE: &str = r#"Goal: {{plan.research_goal}}
Current Step: Researching "{{node}}"

Search Snippets:
{{#each snippets}}
- [{{url}}] {{content}}
{{/each}}

Task:
1. Extract "Atomic Facts" from these snippets. An atomic fact is a single, self-contained truth that DIRECTLY helps answer the Goal.
2. STRICT RELEVANCE: only extract facts that mention specific entities, numbers, dates, or details asked for in the Goal. Skip background and tangents.
3. If a snippet is promising but cut off, or only holds a title, add its URL to "read_more_urls".
4. Prefer fewer, high-quality facts over many low-relevance ones.

Output ONLY raw JSON (no markdown, no code blocks):
{
    "new_facts": [
        {"content": "Fact 1", "source_url": "url..."}
    ],
    "read_more_urls": ["url1"]
}
"#;

const EXTRACT_TEXT_TEMPLATE: &str = r#"Goal: {{plan.research_goal}}
We fetched full content from: {{source_url}}

Content:
{{content}}

Task:
1. Extract "Atomic Facts" from this content. An atomic fact is a single, self-contained truth that DIRECTLY helps answer the Goal.
2. STRICT RELEVANCE: only extract facts that mention specific entities, numbers, dates, or details asked for in the Goal.
3. IGNORE navigation, ads, cookie notices, newsletter forms, footers, sidebars and site metadata.
4. If the content is irrelevant or only boilerplate, return an empty list.

Output ONLY raw JSON (no markdown, no code blocks):
{
    "new_facts": [
        {"content": "Fact 1", "source_url": "url..."}
    ]
}
"#;

const NEIGHBORS_TEMPLATE: &str = r#"Current Goal: {{plan.research_goal}}
Current Notebook (what we know):
{{#each facts}}- {{this}}
{{/each}}

We just finished researching "{{node}}".
{{#if visited}}Already researched:
{{#each visited}}- {{this}}
{{/each}}{{/if}}
Task:
Generate 2-4 new Search Queries ("Neighbors") to explore next.
- Base them on the facts we just found.
- If specific details from the plan are still missing, target those.
- Do NOT repeat queries we already researched.

Output JSON format:
["next query 1", "next query 2"]
"#;

const ANSWER_CHECK_TEMPLATE: &str = r#"Goal: {{plan.research_goal}}
Notebook:
{{#if facts}}{{#each facts}}- {{this}}
{{/each}}{{else}}(empty - no facts collected yet)
{{/if}}
Task:
Look ONLY at the facts listed in the Notebook section. Do NOT use your own knowledge.
If the notebook is empty, you MUST return can_answer: false.
If the facts cover all parts of the goal, return can_answer: true.
Otherwise return can_answer: false.

Output JSON format:
{
    "can_answer": true
}
"#;

const CONDENSE_TEMPLATE: &str = r#"Goal: {{goal}}

Facts:
{{#each facts}}- {{this}}
{{/each}}

Rewrite these facts as one short paragraph of plain text. Keep every number, name and date that matters for the goal. Do not add anything that is not in the facts.
"#;

/// Registered graph reader templates.
pub struct GraphPrompts {
    registry: Handlebars<'static>,
}

impl GraphPrompts {
    pub fn new() -> Result<Self, ParseError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry.register_escape_fn(handlebars::no_escape);
        for (name, source) in [
            (PLAN, PLAN_TEMPLATE),
            (INIT_NODES, INIT_NODES_TEMPLATE),
            (EXTRACT, EXTRACT_TEMPLATE),
            (EXTRACT_TEXT, EXTRACT_TEXT_TEMPLATE),
            (NEIGHBORS, NEIGHBORS_TEMPLATE),
            (ANSWER_CHECK, ANSWER_CHECK_TEMPLATE),
            (CONDENSE, CONDENSE_TEMPLATE),
        ] {
            registry
                .register_template_string(name, source)
                .map_err(|e| ParseError::Template {
                    template: name.to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, ParseError> {
        self.registry
            .render(name, data)
            .map_err(|e| ParseError::Template {
                template: name.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prompts() -> GraphPrompts {
        GraphPrompts::new().unwrap()
    }

    #[test]
    fn test_all_templates_register() {
        let prompts = prompts();
        for name in [PLAN, INIT_NODES, EXTRACT, EXTRACT_TEXT, NEIGHBORS, ANSWER_CHECK, CONDENSE] {
            assert!(prompts.render(name, &json!({})).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_plan_renders_question_unescaped() {
        let out = prompts()
            .render(PLAN, &json!({"question": "Is 3 < 5 & \"true\"?"}))
            .unwrap();
        assert!(out.contains("User Question: Is 3 < 5 & \"true\"?"));
    }

    #[test]
    fn test_init_nodes_lists_plan() {
        let out = prompts()
            .render(
                INIT_NODES,
                &json!({"plan": {"research_goal": "g", "strategy": ["a", "b"], "key_elements": ["X"]}}),
            )
            .unwrap();
        assert!(out.contains("Plan:\n- a\n- b\n"));
        assert!(out.contains("Key Elements:\n- X\n"));
    }

    #[test]
    fn test_answer_check_empty_notebook() {
        let out = prompts()
            .render(ANSWER_CHECK, &json!({"plan": {"research_goal": "g"}, "facts": []}))
            .unwrap();
        assert!(out.contains("(empty - no facts collected yet)"));
        let out = prompts()
            .render(ANSWER_CHECK, &json!({"plan": {"research_goal": "g"}, "facts": ["f1"]}))
            .unwrap();
        assert!(out.contains("- f1\n"));
        assert!(!out.contains("(empty"));
    }

    #[test]
    fn test_extract_lists_snippets() {
        let out = prompts()
            .render(
                EXTRACT,
                &json!({
                    "plan": {"research_goal": "g"},
                    "node": "n",
                    "snippets": [{"url": "https://a", "content": "c"}]
                }),
            )
            .unwrap();
        assert!(out.contains("Researching \"n\""));
        assert!(out.contains("- [https://a] c"));
    }
}
