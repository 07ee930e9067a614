use std::sync::Arc;
use std::time::{Duration, Instant};

use ask_bridge_error::BridgeError;
use ask_bridge_tools::{CompletionOracle, ToolRegistry};
use serde_json::{json, Value};

use crate::chain::SYSTEM_PROMPT;

pub const STOPPED_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_secs(30);

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION_STOP: &str = "\nObservation:";

const MISSING_ACTION: &str = "Invalid Format: Missing 'Action:' after 'Thought:'";
const MISSING_ACTION_INPUT: &str = "Invalid Format: Missing 'Action Input:' after 'Action:'";
const AMBIGUOUS_STEP: &str = "Invalid or incomplete response";

const FORMAT_INSTRUCTIONS: &str = "Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question";

/// Something that answers a prompt, possibly after several tool calls.
///
/// The result is a JSON value; see [`normalize_agent_result`] for how it is
/// turned into the `/ask` response text.
pub trait Agent: Send + Sync {
    fn invoke(&self, input: &str) -> Result<Value, BridgeError>;
}

#[derive(Debug, Clone, Copy)]
pub struct AgentLimits {
    pub max_iterations: usize,
    pub max_execution_time: Duration,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_execution_time: DEFAULT_MAX_EXECUTION_TIME,
        }
    }
}

/// One parsed model turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    Action { tool: String, input: String },
    Finish(String),
    /// Unparseable output; the message is fed back as the observation.
    Invalid(&'static str),
}

pub fn parse_step(text: &str) -> AgentStep {
    let action = find_action(text);
    let answer = text.find(FINAL_ANSWER);
    match (action, answer) {
        (Some((tool, input)), None) => AgentStep::Action { tool, input },
        (None, Some(index)) => AgentStep::Finish(text[index + FINAL_ANSWER.len()..].trim().to_string()),
        (Some(_), Some(_)) => AgentStep::Invalid(AMBIGUOUS_STEP),
        (None, None) if text.contains(ACTION) => AgentStep::Invalid(MISSING_ACTION_INPUT),
        (None, None) => AgentStep::Invalid(MISSING_ACTION),
    }
}

fn find_action(text: &str) -> Option<(String, String)> {
    let start = text.find(ACTION)? + ACTION.len();
    let rest = &text[start..];
    let split = rest.find(ACTION_INPUT)?;
    let tool = rest[..split].trim();
    let input = rest[split + ACTION_INPUT.len()..]
        .trim()
        .trim_matches('"');
    Some((tool.to_string(), input.to_string()))
}

/// Thought/Action/Observation loop over the tool registry.
pub struct ReactAgent {
    oracle: Arc<dyn CompletionOracle>,
    tools: ToolRegistry,
    limits: AgentLimits,
    preamble: String,
}

impl ReactAgent {
    pub fn new(oracle: Arc<dyn CompletionOracle>, tools: ToolRegistry, limits: AgentLimits) -> Self {
        let preamble = render_preamble(&tools);
        Self {
            oracle,
            tools,
            limits,
            preamble,
        }
    }

    pub fn prompt(&self, input: &str, scratchpad: &str) -> String {
        format!(
            "{}\n\nBegin!\n\nQuestion: {input}\nThought:{scratchpad}",
            self.preamble
        )
    }

    /// Runs the loop to a final answer, or to [`STOPPED_MESSAGE`] when the
    /// iteration or time limit is reached. Tool failures never end the loop;
    /// model failures do.
    pub fn run(&self, input: &str) -> Result<String, BridgeError> {
        let started = Instant::now();
        let mut scratchpad = String::new();

        for iteration in 1..=self.limits.max_iterations {
            if started.elapsed() >= self.limits.max_execution_time {
                break;
            }

            let prompt = self.prompt(input, &scratchpad);
            let output = self.oracle.complete_with_stop(&prompt, &[OBSERVATION_STOP])?;

            let observation = match parse_step(&output) {
                AgentStep::Finish(answer) => {
                    tracing::info!(iteration, answer_len = answer.len(), "agent finished");
                    return Ok(answer);
                }
                AgentStep::Action {
                    tool,
                    input: tool_input,
                } => {
                    tracing::debug!(iteration, tool = %tool, "agent action");
                    self.tools.invoke(&tool, &tool_input)
                }
                AgentStep::Invalid(message) => {
                    tracing::debug!(iteration, output = %output, "unparseable agent output");
                    message.to_string()
                }
            };

            scratchpad.push_str(&output);
            scratchpad.push_str("\nObservation: ");
            scratchpad.push_str(&observation);
            scratchpad.push_str("\nThought: ");
        }

        tracing::warn!(
            max_iterations = self.limits.max_iterations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "agent stopped before a final answer"
        );
        Ok(STOPPED_MESSAGE.to_string())
    }
}

impl Agent for ReactAgent {
    fn invoke(&self, input: &str) -> Result<Value, BridgeError> {
        let output = self.run(input)?;
        Ok(json!({ "input": input, "output": output }))
    }
}

fn render_preamble(tools: &ToolRegistry) -> String {
    let descriptions = tools
        .kinds()
        .map(|kind| format!("{}: {}", kind.name(), kind.description()))
        .collect::<Vec<_>>()
        .join("\n");
    let format = FORMAT_INSTRUCTIONS.replace("{tool_names}", &tools.names().join(", "));
    format!(
        "{SYSTEM_PROMPT}\n\nAnswer the following questions as best you can. \
         You have access to the following tools:\n\n{descriptions}\n\n{format}"
    )
}

/// Text for the `response` field of `/ask`: the `output` string of an object
/// result, else its `text` string, else the value itself when it is a
/// string, else its JSON rendering.
pub fn normalize_agent_result(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) => ["output", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::Mutex;

    use ask_bridge_tools::SandboxStore;

    use super::*;

    struct ScriptedOracle {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("prompts lock").clone()
        }
    }

    impl CompletionOracle for ScriptedOracle {
        fn complete(&self, prompt: &str) -> Result<String, BridgeError> {
            self.prompts.lock().expect("prompts lock").push(prompt.to_string());
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .ok_or_else(|| BridgeError::upstream("script exhausted"))
        }
    }

    fn agent_in(dir: &tempfile::TempDir, oracle: Arc<ScriptedOracle>, limits: AgentLimits) -> ReactAgent {
        let store = SandboxStore::open(dir.path()).expect("open store");
        let tools = ToolRegistry::standard(store, oracle.clone(), "python3");
        ReactAgent::new(oracle, tools, limits)
    }

    #[test]
    fn parses_actions_answers_and_garbage() {
        assert_eq!(
            parse_step(" I should look.\nAction: FileExploitation\nAction Input: \"read a.txt\""),
            AgentStep::Action {
                tool: "FileExploitation".to_string(),
                input: "read a.txt".to_string(),
            }
        );
        assert_eq!(
            parse_step(" I now know the final answer\nFinal Answer:  Paris. "),
            AgentStep::Finish("Paris.".to_string())
        );
        assert_eq!(parse_step("just chatting"), AgentStep::Invalid(MISSING_ACTION));
        assert_eq!(
            parse_step("Action: Shell"),
            AgentStep::Invalid(MISSING_ACTION_INPUT)
        );
        assert_eq!(
            parse_step("Action: Shell\nAction Input: ls\nFinal Answer: done"),
            AgentStep::Invalid(AMBIGUOUS_STEP)
        );
    }

    #[test]
    fn tool_observations_feed_the_next_turn() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "alpha").expect("fixture");
        let oracle = ScriptedOracle::new(&[
            " I should list the files.\nAction: FileExploitation\nAction Input: list",
            " I now know the final answer\nFinal Answer: a.txt",
        ]);
        let agent = agent_in(&dir, oracle.clone(), AgentLimits::default());

        let result = agent.invoke("What files are there?").expect("invoke");
        assert_eq!(result, json!({ "input": "What files are there?", "output": "a.txt" }));

        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].starts_with(SYSTEM_PROMPT));
        assert!(prompts[0].contains(
            "should be one of [Python, Shell, FileExploitation, SummarizeFile, QuestionOnFile]"
        ));
        assert!(prompts[0].ends_with("Question: What files are there?\nThought:"));
        assert!(prompts[1].ends_with(
            "Action Input: list\nObservation: a.txt\nThought: "
        ));
    }

    #[test]
    fn stops_at_iteration_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let oracle = ScriptedOracle::new(&["hmm", "hmm", "hmm", "hmm"]);
        let limits = AgentLimits {
            max_iterations: 3,
            ..AgentLimits::default()
        };
        let agent = agent_in(&dir, oracle.clone(), limits);

        assert_eq!(agent.run("loop forever").expect("run"), STOPPED_MESSAGE);
        let prompts = oracle.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains(&format!("hmm\nObservation: {MISSING_ACTION}\nThought: ")));
    }

    #[test]
    fn zero_time_limit_stops_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let oracle = ScriptedOracle::new(&[]);
        let limits = AgentLimits {
            max_execution_time: Duration::ZERO,
            ..AgentLimits::default()
        };
        let agent = agent_in(&dir, oracle.clone(), limits);

        assert_eq!(agent.run("anything").expect("run"), STOPPED_MESSAGE);
        assert!(oracle.prompts().is_empty());
    }

    #[test]
    fn oracle_failures_abort_the_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let agent = agent_in(&dir, ScriptedOracle::new(&[]), AgentLimits::default());
        let err = agent.invoke("hello").expect_err("oracle is empty");
        assert_eq!(err.to_string(), "script exhausted");
    }

    #[test]
    fn unknown_tools_come_back_as_observations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let oracle = ScriptedOracle::new(&[
            "Action: Browser\nAction Input: open",
            "Final Answer: no browser",
        ]);
        let agent = agent_in(&dir, oracle.clone(), AgentLimits::default());

        assert_eq!(agent.run("browse").expect("run"), "no browser");
        assert!(oracle.prompts()[1].contains("Observation: Browser is not a valid tool, try one of ["));
    }

    #[test]
    fn normalizes_agent_results() {
        assert_eq!(normalize_agent_result(&json!({ "output": "hi", "text": "no" })), "hi");
        assert_eq!(normalize_agent_result(&json!({ "text": "from text" })), "from text");
        assert_eq!(normalize_agent_result(&json!("plain")), "plain");
        assert_eq!(normalize_agent_result(&json!({ "other": 1 })), "{\"other\":1}");
        assert_eq!(normalize_agent_result(&json!(42)), "42");
    }
}
