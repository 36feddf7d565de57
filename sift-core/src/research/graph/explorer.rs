//! Planning and the breadth-first exploration loop.

use super::prompts::{
    self, EXTRACTOR_SYSTEM_PROMPT, NAVIGATOR_SYSTEM_PROMPT, PLANNER_SYSTEM_PROMPT,
    VALIDATOR_SYSTEM_PROMPT,
};
use super::{GraphReaderStrategy, GraphState, Node, RationalPlan, derive_goal};
use crate::config::NodeFailurePolicy;
use crate::error::Result;
use crate::json_extract::parse_json;
use crate::notebook::AtomicFact;
use crate::research::session::{ResearchPhase, ResearchSession};
use crate::research::strategy::Role;
use crate::sanitize::{content_of, truncate_str};
use crate::types::SearchResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

/// URL fragments of ad redirects and click trackers. Matched
/// case-insensitively anywhere in the URL.
const AD_PATTERNS: &[&str] = &[
    "duckduckgo.com/y.js",
    "ad_domain=",
    "ad_provider=",
    "ad_type=",
    "doubleclick.net",
    "googlesyndication.com",
    "googleadservices.com",
    "click.linksynergy.com",
    "redirect.viglink.com",
    "/aclk?",
    "amazon-adsystem.com",
    "ads.yahoo.com",
    "clickserve",
    "tracking.php",
];

/// True for ad redirect and tracking URLs, which are never fetched.
pub fn is_ad_or_tracker_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    AD_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Default, Deserialize)]
struct PlanResponse {
    #[serde(default)]
    research_goal: String,
    #[serde(default)]
    strategy: Vec<String>,
    #[serde(default)]
    key_elements: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    new_facts: Vec<AtomicFact>,
    #[serde(default)]
    read_more_urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnswerCheckResponse {
    #[serde(default)]
    can_answer: bool,
}

#[derive(Serialize)]
struct Snippet<'a> {
    url: &'a str,
    content: &'a str,
}

impl<'a> From<&'a SearchResult> for Snippet<'a> {
    fn from(result: &'a SearchResult) -> Self {
        let snippet = result.snippet.trim();
        Self {
            url: result.url.trim(),
            content: if snippet.is_empty() {
                result.title.trim()
            } else {
                snippet
            },
        }
    }
}

fn trim_strings(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// How the exploration loop ended.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct ExploreOutcome {
    pub steps: usize,
    /// The validator judged the notebook sufficient.
    pub sufficient: bool,
    /// The loop stopped because the step budget ran out.
    pub budget_spent: bool,
}

/// Turn a tolerable failure into `None`; caller aborts still propagate.
fn tolerate<T>(result: Result<T>, what: &'static str, node: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_abort() => Err(e),
        Err(e) => {
            warn!(node, error = %e, "{what} failed, continuing");
            Ok(None)
        }
    }
}

impl GraphReaderStrategy {
    pub(super) async fn plan(&self, session: &mut ResearchSession) -> Result<RationalPlan> {
        session.enter(ResearchPhase::Planning);
        let question = session.question.clone();
        let user = self.prompts.render(prompts::PLAN, &json!({ "question": question }))?;
        let generation = session
            .generate(Role::Planner.as_str(), self.planner.as_ref(), PLANNER_SYSTEM_PROMPT, &user)
            .await?;
        let parsed: PlanResponse = parse_json(&content_of(&generation), "plan")?;

        let goal = parsed.research_goal.trim();
        let research_goal = if goal.is_empty() {
            derive_goal(&question, self.config.goal_max_chars)
        } else {
            goal.to_string()
        };
        let plan = RationalPlan {
            original_question: question,
            research_goal,
            strategy: trim_strings(parsed.strategy),
            key_elements: trim_strings(parsed.key_elements),
        };
        info!(
            goal = %plan.research_goal,
            steps = plan.strategy.len(),
            key_elements = plan.key_elements.len(),
            "Research plan ready"
        );
        Ok(plan)
    }

    pub(super) async fn initial_nodes(
        &self,
        session: &mut ResearchSession,
        plan: &RationalPlan,
    ) -> Result<Vec<Node>> {
        let user = self.prompts.render(prompts::INIT_NODES, &json!({ "plan": plan }))?;
        let generation = session
            .generate(Role::Planner.as_str(), self.planner.as_ref(), PLANNER_SYSTEM_PROMPT, &user)
            .await?;
        let queries: Vec<String> = parse_json(&content_of(&generation), "init nodes")?;
        let mut nodes: Vec<Node> = trim_strings(queries)
            .into_iter()
            .map(|q| Node::new(q, "initial", 0))
            .collect();
        if nodes.is_empty() {
            warn!("Planner proposed no initial queries, searching the research goal");
            nodes.push(Node::new(plan.research_goal.clone(), "research goal", 0));
        }
        Ok(nodes)
    }

    pub(super) async fn explore(
        &self,
        session: &mut ResearchSession,
        state: &mut GraphState,
    ) -> Result<ExploreOutcome> {
        let mut outcome = ExploreOutcome::default();

        while outcome.steps < self.config.max_steps {
            let Some(node) = state.dequeue() else {
                return Ok(outcome);
            };
            outcome.steps += 1;
            if !state.mark_visited(&node.name) {
                continue;
            }
            debug!(step = outcome.steps, node = %node.name, depth = node.depth, "Exploring node");

            session.enter(ResearchPhase::Searching);
            let results = match session.search(self.search.as_ref(), &node.name).await {
                Ok(results) => results,
                Err(e) if e.is_abort() => return Err(e),
                Err(e) if self.config.failure_policy == NodeFailurePolicy::Abort => return Err(e),
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Search failed, skipping node");
                    continue;
                }
            };

            let extraction = tolerate(
                self.extract_from_snippets(session, state, &node, &results).await,
                "Fact extraction",
                &node.name,
            )?;
            if let Some(extraction) = extraction {
                let added = state.notebook.add_facts(extraction.new_facts);
                debug!(node = %node.name, added, total = state.notebook.len(), "Facts from snippets");
                self.read_more(session, state, &node, extraction.read_more_urls)
                    .await?;
            }

            if self.is_sufficient(session, state, &node).await? {
                outcome.sufficient = true;
                info!(step = outcome.steps, facts = state.notebook.len(), "Notebook can answer the goal");
                return Ok(outcome);
            }

            let neighbors = tolerate(
                self.neighbors(session, state, &node).await,
                "Neighbor generation",
                &node.name,
            )?;
            for neighbor in neighbors.unwrap_or_default() {
                state.enqueue(neighbor);
            }
        }

        outcome.budget_spent = true;
        Ok(outcome)
    }

    async fn extract_from_snippets(
        &self,
        session: &mut ResearchSession,
        state: &GraphState,
        node: &Node,
        results: &[SearchResult],
    ) -> Result<ExtractResponse> {
        session.enter(ResearchPhase::Extracting);
        let snippets: Vec<Snippet<'_>> = results.iter().map(Snippet::from).collect();
        let user = self.prompts.render(
            prompts::EXTRACT,
            &json!({ "plan": state.plan, "node": node.name, "snippets": snippets }),
        )?;
        let generation = session
            .generate(
                Role::Extractor.as_str(),
                self.extractor.as_ref(),
                EXTRACTOR_SYSTEM_PROMPT,
                &user,
            )
            .await?;
        Ok(parse_json(&content_of(&generation), "extract")?)
    }

    /// Fetch and mine the pages the extractor asked to read in full.
    async fn read_more(
        &self,
        session: &mut ResearchSession,
        state: &mut GraphState,
        node: &Node,
        urls: Vec<String>,
    ) -> Result<()> {
        let Some(fetcher) = self.fetch.as_deref() else {
            return Ok(());
        };
        let mut attempted = 0;
        for url in trim_strings(urls) {
            if attempted >= self.config.max_read_more_per_node {
                debug!(node = %node.name, "Read-more limit reached");
                break;
            }
            if is_ad_or_tracker_url(&url) {
                warn!(url = %truncate_str(&url, 120), "Skipping ad/tracker URL");
                continue;
            }
            if !state.mark_fetched(&url) {
                continue;
            }
            attempted += 1;

            session.enter(ResearchPhase::Fetching);
            let Some(body) = tolerate(session.fetch(fetcher, &url).await, "Fetch", &node.name)?
            else {
                continue;
            };
            let body = body.trim();
            let chars = body.chars().count();
            if chars < self.config.min_page_chars {
                debug!(url = %url, chars, "Skipping too-short page");
                continue;
            }

            let facts = tolerate(
                self.extract_from_page(session, state, &url, body).await,
                "Page extraction",
                &node.name,
            )?;
            if let Some(facts) = facts {
                let added = state.notebook.add_facts(facts);
                debug!(url = %url, added, total = state.notebook.len(), "Facts from page");
            }
        }
        Ok(())
    }

    async fn extract_from_page(
        &self,
        session: &mut ResearchSession,
        state: &GraphState,
        url: &str,
        body: &str,
    ) -> Result<Vec<AtomicFact>> {
        session.enter(ResearchPhase::Extracting);
        let user = self.prompts.render(
            prompts::EXTRACT_TEXT,
            &json!({ "plan": state.plan, "source_url": url, "content": body }),
        )?;
        let generation = session
            .generate(
                Role::Extractor.as_str(),
                self.extractor.as_ref(),
                EXTRACTOR_SYSTEM_PROMPT,
                &user,
            )
            .await?;
        let parsed: ExtractResponse = parse_json(&content_of(&generation), "extract text")?;
        Ok(parsed
            .new_facts
            .into_iter()
            .map(|mut fact| {
                if fact.source_url.trim().is_empty() {
                    fact.source_url = url.to_string();
                }
                fact
            })
            .collect())
    }

    /// Ask the validator whether the notebook already answers the goal.
    /// Skipped below the minimum fact count; failures count as "not yet".
    async fn is_sufficient(
        &self,
        session: &mut ResearchSession,
        state: &GraphState,
        node: &Node,
    ) -> Result<bool> {
        let count = state.notebook.len();
        if count == 0 || count < self.config.min_facts_for_check {
            debug!(facts = count, "Skipping answer check");
            return Ok(false);
        }
        let verdict = self.ask_validator(session, state).await;
        Ok(tolerate(verdict, "Answer check", &node.name)?.unwrap_or(false))
    }

    async fn ask_validator(&self, session: &mut ResearchSession, state: &GraphState) -> Result<bool> {
        session.enter(ResearchPhase::Checking);
        let facts: Vec<&str> = state.notebook.facts().iter().map(|f| f.content.as_str()).collect();
        let user = self
            .prompts
            .render(prompts::ANSWER_CHECK, &json!({ "plan": state.plan, "facts": facts }))?;
        let generation = session
            .generate(
                Role::Validator.as_str(),
                self.validator.as_ref(),
                VALIDATOR_SYSTEM_PROMPT,
                &user,
            )
            .await?;
        let parsed: AnswerCheckResponse = parse_json(&content_of(&generation), "answer check")?;
        Ok(parsed.can_answer)
    }

    async fn neighbors(
        &self,
        session: &mut ResearchSession,
        state: &GraphState,
        node: &Node,
    ) -> Result<Vec<Node>> {
        session.enter(ResearchPhase::Navigating);
        let facts: Vec<&str> = state.notebook.facts().iter().map(|f| f.content.as_str()).collect();
        let user = self.prompts.render(
            prompts::NEIGHBORS,
            &json!({
                "plan": state.plan,
                "facts": facts,
                "node": node.name,
                "visited": state.visited_names(),
            }),
        )?;
        let generation = session
            .generate(
                Role::Navigator.as_str(),
                self.navigator.as_ref(),
                NAVIGATOR_SYSTEM_PROMPT,
                &user,
            )
            .await?;
        let queries: Vec<String> = parse_json(&content_of(&generation), "neighbors")?;
        Ok(trim_strings(queries)
            .into_iter()
            .map(|q| Node::new(q, "neighbor", node.depth + 1))
            .collect())
    }
}
