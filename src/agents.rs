//! Agent pages: the agent list and each agent's system prompt.
//!
//! An agent is a page with the property `type:: agent`. Its system prompt is
//! the block tree under the page's `## System Prompt` block, flattened into
//! indented markdown before it is handed to a model.

use crate::config::LiveQueryConfig;
use crate::error::{QueryError, Result};
use crate::scheduler::Scheduler;
use crate::source::DataSource;
use crate::subscriptions::LiveQuery;
use crate::types::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Every page whose `type` property is `"agent"`.
pub const AGENT_LIST_QUERY: &str = r#"
  [:find (pull ?p [*])
   :where
     [?p :block/name]
     [?p :block/properties ?props]
     [(get ?props :type) ?type]
     [(= ?type "agent")]]
"#;

/// Children of the `## System Prompt` block on the page named `?name`.
const SYSTEM_PROMPT_QUERY: &str = r###"
  [:find (pull ?b [:block/content :block/properties {:block/_parent ...}])
   :in $ ?name
   :where
     [?p :block/name ?name]
     [?parent :block/page ?p]
     [?parent :block/content "## System Prompt"]
     [?b :block/parent ?parent]]
"###;

const DEFAULT_DESCRIPTION: &str = "No description available";

/// An agent as shown in the picker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl AgentInfo {
    /// Map a pulled page to an agent. Pages without a uuid or name are skipped.
    pub fn from_page(page: &Value) -> Option<Self> {
        let id = page.get("uuid")?.as_str()?.to_string();
        let name = page.get("name")?.as_str()?.to_string();
        let description = page
            .get("properties")
            .and_then(|props| props.get("description"))
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string();

        Some(Self {
            id,
            name,
            description,
        })
    }
}

/// Pull queries return one tuple per match; unwrap one level of nesting.
fn flatten_rows(rows: &[Value]) -> impl Iterator<Item = &Value> {
    rows.iter().flat_map(|row| match row {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    })
}

/// Agents found in the result of [`AGENT_LIST_QUERY`].
pub fn agents_from_rows(rows: &[Value]) -> Vec<AgentInfo> {
    flatten_rows(rows)
        .filter_map(|page| {
            let agent = AgentInfo::from_page(page);
            if agent.is_none() {
                tracing::debug!(?page, "skipping page without uuid or name");
            }
            agent
        })
        .collect()
}

/// Query for an agent's system prompt blocks. An empty name yields the
/// empty query, which nothing evaluates.
pub fn system_prompt_query(agent_name: &str) -> Query {
    if agent_name.trim().is_empty() {
        return Query::empty();
    }
    // Page names are stored lower-cased.
    Query::new(SYSTEM_PROMPT_QUERY).bind(agent_name.to_lowercase())
}

/// A block and its children.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "block/content", alias = "content", default)]
    pub content: String,

    #[serde(
        rename = "block/children",
        alias = "children",
        alias = "block/_parent",
        default
    )]
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }
}

/// Blocks found in the result of [`system_prompt_query`].
pub fn blocks_from_rows(rows: &[Value]) -> Result<Vec<Block>> {
    flatten_rows(rows)
        .map(|row| serde_json::from_value::<Block>(row.clone()).map_err(QueryError::from))
        .collect()
}

/// Flatten a block tree into markdown: one line per block, children
/// indented two spaces under their parent.
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| {
            if block.children.is_empty() {
                return block.content.clone();
            }
            let nested = blocks_to_markdown(&block.children)
                .split('\n')
                .map(|line| format!("  {line}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("{}\n{}", block.content, nested)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Live list of agents.
pub struct AgentDirectory {
    query: LiveQuery,
}

impl AgentDirectory {
    pub fn new(
        source: Arc<dyn DataSource>,
        scheduler: Arc<dyn Scheduler>,
        config: &LiveQueryConfig,
    ) -> Self {
        Self {
            query: LiveQuery::new(source, scheduler, AGENT_LIST_QUERY, config),
        }
    }

    pub fn agents(&self) -> Vec<AgentInfo> {
        agents_from_rows(&self.query.results())
    }

    pub fn find(&self, id: &str) -> Option<AgentInfo> {
        self.agents().into_iter().find(|agent| agent.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.query.is_loading()
    }

    pub fn live_query(&self) -> &LiveQuery {
        &self.query
    }
}

/// Live system prompt of the selected agent.
///
/// Selecting another agent swaps the underlying query; with no agent
/// selected the query is disabled.
pub struct AgentPrompt {
    query: LiveQuery,
}

impl AgentPrompt {
    pub fn new(
        source: Arc<dyn DataSource>,
        scheduler: Arc<dyn Scheduler>,
        config: &LiveQueryConfig,
    ) -> Self {
        Self {
            query: LiveQuery::new(
                source,
                scheduler,
                Query::empty(),
                &LiveQueryConfig {
                    enabled: false,
                    ..config.clone()
                },
            ),
        }
    }

    pub fn select(&self, agent: Option<&AgentInfo>) {
        match agent {
            Some(agent) => {
                self.query.set_query(system_prompt_query(&agent.name));
                self.query.set_enabled(true);
            }
            None => {
                self.query.set_enabled(false);
                self.query.set_query(Query::empty());
            }
        }
    }

    pub fn blocks(&self) -> Result<Vec<Block>> {
        blocks_from_rows(&self.query.results())
    }

    /// The prompt as markdown, or an empty string when nothing is selected.
    pub fn markdown(&self) -> Result<String> {
        Ok(blocks_to_markdown(&self.blocks()?))
    }

    pub fn is_loading(&self) -> bool {
        self.query.is_loading()
    }

    pub fn live_query(&self) -> &LiveQuery {
        &self.query
    }
}
