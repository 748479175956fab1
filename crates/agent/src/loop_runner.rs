//! The agent orchestration loop.
//!
//! [`Agent::run`] returns a [`Turn`]: a pull-based, single-pass sequence of
//! [`AgentEvent`]s. Each call to [`Turn::next`] advances an explicit state
//! machine just far enough to produce the next event:
//!
//! 1. **Request**: open a streaming completion with the full conversation
//!    and the tool catalog
//! 2. **Stream**: forward text fragments as they arrive; collect tool-call
//!    fragments by index
//! 3. **Tools**: if the model asked for tools, record the assistant message
//!    and run each call in order, pausing on the confirmation gate for
//!    dangerous ones; then go back to 1
//!
//! The turn ends when a response carries no tool calls, on a stream error,
//! or when the iteration bound is hit.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use starbot_core::event::{DomainEvent, EventBus};
use starbot_core::message::{Message, MessageToolCall, Role};
use starbot_core::provider::{ChunkReceiver, Provider, ProviderRequest, Usage};
use starbot_core::tool::{ToolContext, ToolRegistry};
use starbot_memory::{ConversationMemory, MemoryLimits};
use tracing::{debug, info, warn};

use crate::assembler::ToolCallAssembler;
use crate::confirm::ConfirmationGate;
use crate::prompt::{CONTINUE_REMINDER, default_system_prompt};
use crate::stream_event::AgentEvent;

/// Tool result recorded when the user refuses a dangerous call.
pub const DENIAL_MARKER: &str = "[user denied execution]";

/// Prefix of tool results produced from a tool failure.
pub const ERROR_MARKER: &str = "[error] ";

/// One conversation's agent: the provider, the tools, and the message log.
pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    /// `None` means unbounded
    max_iterations: Option<u32>,
    confirm_dangerous: bool,
    system_prompt: String,
    memory: ConversationMemory,
    gate: ConfirmationGate,
    usage: Usage,
    conversation_id: Option<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl Agent {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, model: impl Into<String>) -> Self {
        let system_prompt = default_system_prompt();
        let memory = ConversationMemory::with_system_prompt(MemoryLimits::default(), system_prompt.clone());
        Self {
            provider,
            tools,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: Some(30),
            confirm_dangerous: false,
            system_prompt,
            memory,
            gate: ConfirmationGate::new(),
            usage: Usage::default(),
            conversation_id: None,
            event_bus: None,
        }
    }

    /// Replace the built-in system prompt. Resets the conversation.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self.memory = ConversationMemory::with_system_prompt(self.memory.limits(), self.system_prompt.clone());
        self
    }

    /// Set compaction limits. Resets the conversation.
    pub fn with_memory_limits(mut self, limits: MemoryLimits) -> Self {
        self.memory = ConversationMemory::with_system_prompt(limits, self.system_prompt.clone());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Completion requests allowed per turn. `None` lifts the bound.
    pub fn with_max_iterations(mut self, max: Option<u32>) -> Self {
        self.max_iterations = max;
        self
    }

    /// Require a gate decision before running dangerous tools.
    pub fn with_confirm_dangerous(mut self, enabled: bool) -> Self {
        self.confirm_dangerous = enabled;
        self
    }

    /// Conversation id handed to tools through [`ToolContext`].
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Handle for answering confirmation requests. Clone it before calling
    /// [`run`](Self::run), which borrows the agent for the whole turn.
    pub fn confirmation_gate(&self) -> ConfirmationGate {
        self.gate.clone()
    }

    pub fn messages(&self) -> &[Message] {
        self.memory.messages()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Cumulative token usage since construction or the last reset.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Names of the registered tools, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    /// Clear to the system messages and zero the usage counters.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.usage = Usage::default();
        self.gate.reset();
    }

    /// Resume a saved conversation.
    ///
    /// The system prompt is prepended when the saved log has no system
    /// message; with `continue_reminder` a note asking the model to read the
    /// history is appended. The result goes through compaction.
    pub fn load_messages(&mut self, messages: Vec<Message>, continue_reminder: bool) {
        if messages.is_empty() {
            self.memory = ConversationMemory::with_system_prompt(self.memory.limits(), self.system_prompt.clone());
            return;
        }

        let mut merged = Vec::with_capacity(messages.len() + 2);
        if !messages.iter().any(|m| m.role == Role::System) {
            merged.push(Message::system(self.system_prompt.clone()));
        }
        merged.extend(messages);
        if continue_reminder {
            merged.push(Message::system(CONTINUE_REMINDER));
        }
        self.memory.set_messages(merged);
    }

    /// Start a turn for `input`. Nothing happens until the turn is polled.
    pub fn run(&mut self, input: impl Into<String>) -> Turn<'_> {
        Turn {
            agent: self,
            phase: Phase::Start(input.into()),
            pending: VecDeque::new(),
            iteration: 0,
        }
    }

    fn build_request(&self) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: self.memory.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
            json_response: false,
        }
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            conversation_id: self.conversation_id.clone(),
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    async fn execute_tool(&self, call: &MessageToolCall) -> String {
        let started = Instant::now();
        let result = self.tools.invoke(&call.name, &call.arguments, &self.tool_context()).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        self.publish(DomainEvent::ToolExecuted {
            tool_name: call.name.clone(),
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match result {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("{ERROR_MARKER}{e}")
            }
        }
    }
}

enum Phase {
    Start(String),
    Request,
    Streaming {
        rx: ChunkReceiver,
        assembler: ToolCallAssembler,
        text: String,
        usage: Option<Usage>,
    },
    Tools(VecDeque<MessageToolCall>),
    Confirming(MessageToolCall, VecDeque<MessageToolCall>),
    Executing(MessageToolCall, VecDeque<MessageToolCall>),
    Done,
}

/// A single conversational turn, consumed with [`next`](Self::next).
pub struct Turn<'a> {
    agent: &'a mut Agent,
    phase: Phase,
    pending: VecDeque<AgentEvent>,
    iteration: u32,
}

impl Turn<'_> {
    /// Completion requests issued so far in this turn.
    pub fn iterations(&self) -> u32 {
        self.iteration
    }

    /// Advance to the next event. `None` once the turn is over.
    pub async fn next(&mut self) -> Option<AgentEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,

                Phase::Start(input) => {
                    info!(
                        conversation_id = self.agent.conversation_id.as_deref().unwrap_or("-"),
                        "Starting turn"
                    );
                    self.agent.memory.add_user(input);
                    self.phase = Phase::Request;
                }

                Phase::Request => self.open_stream().await,

                Phase::Streaming {
                    mut rx,
                    mut assembler,
                    mut text,
                    mut usage,
                } => match rx.recv().await {
                    Some(Ok(chunk)) => {
                        if let Some(u) = chunk.usage {
                            usage = Some(u);
                        }
                        for delta in &chunk.tool_calls {
                            assembler.push(delta);
                        }
                        if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                            text.push_str(&content);
                            self.pending.push_back(AgentEvent::Text { content });
                        }
                        if chunk.done {
                            self.finish_stream(assembler, text, usage);
                        } else {
                            self.phase = Phase::Streaming {
                                rx,
                                assembler,
                                text,
                                usage,
                            };
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Completion stream failed");
                        self.pending.push_back(AgentEvent::Error {
                            message: e.to_string(),
                        });
                    }
                    None => self.finish_stream(assembler, text, usage),
                },

                Phase::Tools(mut calls) => {
                    let Some(call) = calls.pop_front() else {
                        self.phase = Phase::Request;
                        continue;
                    };

                    self.pending.push_back(AgentEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    });

                    if self.agent.confirm_dangerous && self.agent.tools.is_dangerous(&call.name) {
                        self.pending.push_back(AgentEvent::ConfirmationRequested {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        });
                        self.phase = Phase::Confirming(call, calls);
                    } else {
                        self.phase = Phase::Executing(call, calls);
                    }
                }

                Phase::Confirming(call, calls) => {
                    if self.agent.gate.wait().await {
                        self.phase = Phase::Executing(call, calls);
                    } else {
                        debug!(tool = %call.name, "Tool call denied");
                        self.record_result(&call, DENIAL_MARKER.to_string());
                        self.phase = Phase::Tools(calls);
                    }
                }

                Phase::Executing(call, calls) => {
                    let output = self.agent.execute_tool(&call).await;
                    self.record_result(&call, output);
                    self.phase = Phase::Tools(calls);
                }
            }
        }
    }

    async fn open_stream(&mut self) {
        if let Some(max) = self.agent.max_iterations {
            if self.iteration >= max {
                warn!(iterations = self.iteration, "Max iterations reached");
                self.pending.push_back(AgentEvent::Error {
                    message: format!("Max iterations reached ({max})"),
                });
                return;
            }
        }
        self.iteration += 1;
        debug!(iteration = self.iteration, "Agent loop iteration");

        let request = self.agent.build_request();
        match self.agent.provider.stream(request).await {
            Ok(rx) => {
                self.phase = Phase::Streaming {
                    rx,
                    assembler: ToolCallAssembler::new(),
                    text: String::new(),
                    usage: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Completion request failed");
                self.pending.push_back(AgentEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn finish_stream(&mut self, assembler: ToolCallAssembler, text: String, usage: Option<Usage>) {
        if let Some(request) = usage {
            self.agent.usage.accumulate(&request);
            self.pending.push_back(AgentEvent::Usage {
                request,
                cumulative: self.agent.usage,
            });
            self.agent.publish(DomainEvent::ResponseGenerated {
                model: self.agent.model.clone(),
                tokens_used: request.total_tokens,
                timestamp: Utc::now(),
            });
        }

        if assembler.is_empty() {
            self.agent.memory.add_assistant(text);
            // Terminal: phase stays Done
            return;
        }

        let calls = assembler.finish();
        debug!(tool_count = calls.len(), "Model requested tools");
        self.agent.memory.add_assistant_tool_calls(Some(text), calls.clone());
        self.phase = Phase::Tools(calls.into());
    }

    fn record_result(&mut self, call: &MessageToolCall, output: String) {
        self.agent.memory.add_tool_result(&call.id, &output);
        self.pending.push_back(AgentEvent::ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            output,
        });
    }

    /// Drain the turn, collecting every event. Confirmation requests are
    /// answered from the gate as usual, so something must feed it.
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use starbot_core::error::{ProviderError, ToolError};
    use starbot_core::provider::{ProviderResponse, StreamChunk, ToolCallDelta};
    use starbot_core::tool::Tool;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays pre-arranged chunk scripts, one script per request.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Vec<Result<StreamChunk, ProviderError>>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Vec<Result<StreamChunk, ProviderError>>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("stream only".into()))
        }

        async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or_else(|| vec![Ok(text("fallback"))]);
            let (tx, rx) = tokio::sync::mpsc::channel(script.len().max(1));
            for item in script {
                tx.try_send(item).unwrap();
            }
            Ok(rx)
        }
    }

    fn text(s: &str) -> StreamChunk {
        StreamChunk {
            content: Some(s.into()),
            ..Default::default()
        }
    }

    fn tool_frag(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> StreamChunk {
        StreamChunk {
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(String::from),
                name: name.map(String::from),
                arguments: Some(args.into()),
            }],
            ..Default::default()
        }
    }

    fn usage(total: u32) -> StreamChunk {
        StreamChunk {
            usage: Some(Usage {
                prompt_tokens: total / 2,
                completion_tokens: total - total / 2,
                total_tokens: total,
            }),
            done: true,
            ..Default::default()
        }
    }

    struct CountingTool {
        name: &'static str,
        dangerous: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn dangerous(&self) -> bool {
            self.dangerous
        }
        async fn execute(&self, arguments: serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if arguments["fail"].as_bool() == Some(true) {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.name.into(),
                    reason: "boom".into(),
                });
            }
            Ok(format!(
                "{} ran for {}",
                self.name,
                ctx.conversation_id.as_deref().unwrap_or("nobody")
            ))
        }
    }

    fn registry(dangerous: bool) -> (Arc<ToolRegistry>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CountingTool {
            name: "counter",
            dangerous,
            calls: calls.clone(),
        }));
        (Arc::new(registry), calls)
    }

    fn agent(provider: Arc<ScriptedProvider>, tools: Arc<ToolRegistry>) -> Agent {
        Agent::new(provider, tools, "test-model")
            .with_system_prompt("You are a test agent")
            .with_conversation_id("conv-1")
    }

    #[tokio::test]
    async fn text_only_turn() {
        let provider = ScriptedProvider::new(vec![vec![Ok(text("Hello")), Ok(text(" there")), Ok(usage(10))]]);
        let (tools, _) = registry(false);
        let mut agent = agent(provider, tools);

        let events = agent.run("hi").collect().await;
        assert_eq!(events[0], AgentEvent::Text { content: "Hello".into() });
        assert_eq!(events[1], AgentEvent::Text { content: " there".into() });
        assert!(matches!(events[2], AgentEvent::Usage { .. }));
        assert_eq!(events.len(), 3);

        let last = agent.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.text(), "Hello there");
        assert!(last.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let provider = ScriptedProvider::new(vec![
            vec![
                Ok(tool_frag(0, Some("call_1"), Some("counter"), "{\"pa")),
                Ok(tool_frag(0, None, None, "th\":\"/tmp\"}")),
                Ok(usage(20)),
            ],
            vec![Ok(text("done")), Ok(usage(6))],
        ]);
        let (tools, calls) = registry(false);
        let mut agent = agent(provider.clone(), tools);

        let events = agent.run("look").collect().await;
        let kinds: Vec<_> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(kinds, vec!["usage", "tool_call", "tool_result", "text", "usage"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        match &events[2] {
            AgentEvent::ToolResult { output, .. } => assert_eq!(output, "counter ran for conv-1"),
            other => panic!("unexpected {other:?}"),
        }
        match &events[4] {
            AgentEvent::Usage { request, cumulative } => {
                assert_eq!(request.total_tokens, 6);
                assert_eq!(cumulative.total_tokens, 26);
            }
            other => panic!("unexpected {other:?}"),
        }

        // system, user, assistant(tool_calls), tool, assistant
        let roles: Vec<_> = agent.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(agent.messages()[2].tool_calls[0].arguments, "{\"path\":\"/tmp\"}");
        assert_eq!(agent.messages()[3].tool_call_id.as_deref(), Some("call_1"));

        // Second request carried the tool result
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[0].tools.len(), 1);
    }

    #[tokio::test]
    async fn domain_events_reach_the_bus() {
        let provider = ScriptedProvider::new(vec![
            vec![Ok(tool_frag(0, Some("call_1"), Some("counter"), "{}")), Ok(usage(20))],
            vec![Ok(text("done")), Ok(usage(6))],
        ]);
        let (tools, _) = registry(false);
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let mut agent = agent(provider, tools).with_event_bus(bus);

        agent.run("look").collect().await;

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(match event.as_ref() {
                DomainEvent::ResponseGenerated { tokens_used, .. } => format!("response:{tokens_used}"),
                DomainEvent::ToolExecuted { tool_name, success, .. } => format!("tool:{tool_name}:{success}"),
                other => format!("{other:?}"),
            });
        }
        assert_eq!(seen, vec!["response:20", "tool:counter:true", "response:6"]);
    }

    #[tokio::test]
    async fn tool_failure_becomes_error_marker() {
        let provider = ScriptedProvider::new(vec![
            vec![Ok(tool_frag(0, Some("c1"), Some("counter"), "{\"fail\":true}"))],
            vec![Ok(text("recovered"))],
        ]);
        let (tools, _) = registry(false);
        let mut agent = agent(provider, tools);

        let events = agent.run("try").collect().await;
        let output = events
            .iter()
            .find_map(|e| match e {
                AgentEvent::ToolResult { output, .. } => Some(output.clone()),
                _ => None,
            })
            .unwrap();
        assert!(output.starts_with(ERROR_MARKER));
        assert!(output.contains("boom"));
        assert_eq!(agent.messages().last().unwrap().text(), "recovered");
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_json_do_not_abort() {
        let provider = ScriptedProvider::new(vec![
            vec![
                Ok(tool_frag(0, Some("c1"), Some("ghost"), "{}")),
                Ok(tool_frag(1, Some("c2"), Some("counter"), "{\"unterminated\":")),
            ],
            vec![Ok(text("ok"))],
        ]);
        let (tools, calls) = registry(false);
        let mut agent = agent(provider, tools);

        let events = agent.run("go").collect().await;
        let outputs: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::ToolResult { output, .. } => Some(output.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(outputs.len(), 2);
        assert!(outputs[0].starts_with(ERROR_MARKER) && outputs[0].contains("ghost"));
        assert!(outputs[1].starts_with(ERROR_MARKER));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn iteration_limit_ends_turn_with_error() {
        let looping = || vec![Ok(tool_frag(0, Some("c"), Some("counter"), "{}"))];
        let provider = ScriptedProvider::new(vec![looping(), looping(), looping()]);
        let (tools, calls) = registry(false);
        let mut agent = agent(provider.clone(), tools).with_max_iterations(Some(2));

        let events = agent.run("forever").collect().await;
        assert!(matches!(
            events.last(),
            Some(AgentEvent::Error { message }) if message.contains("Max iterations")
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stream_error_is_terminal() {
        let provider = ScriptedProvider::new(vec![vec![
            Ok(text("partial")),
            Err(ProviderError::StreamInterrupted("reset by peer".into())),
        ]]);
        let (tools, _) = registry(false);
        let mut agent = agent(provider, tools);

        let events = agent.run("hi").collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], AgentEvent::Error { message } if message.contains("reset by peer")));
    }

    #[tokio::test]
    async fn confirmation_answered_before_wait() {
        let provider = ScriptedProvider::new(vec![
            vec![Ok(tool_frag(0, Some("c1"), Some("counter"), "{}"))],
            vec![Ok(text("ok"))],
        ]);
        let (tools, calls) = registry(true);
        let mut agent = agent(provider, tools).with_confirm_dangerous(true);
        let gate = agent.confirmation_gate();

        let mut turn = agent.run("do it");
        assert!(matches!(turn.next().await, Some(AgentEvent::ToolCall { .. })));
        assert!(matches!(turn.next().await, Some(AgentEvent::ConfirmationRequested { .. })));
        gate.decide(true);
        assert!(matches!(turn.next().await, Some(AgentEvent::ToolResult { .. })));
        while turn.next().await.is_some() {}
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn confirmation_answered_while_waiting() {
        let provider = ScriptedProvider::new(vec![
            vec![Ok(tool_frag(0, Some("c1"), Some("counter"), "{}"))],
            vec![Ok(text("ok"))],
        ]);
        let (tools, calls) = registry(true);
        let mut agent = agent(provider, tools).with_confirm_dangerous(true);
        let gate = agent.confirmation_gate();

        let approver = {
            let gate = gate.clone();
            tokio::spawn(async move {
                while !gate.is_waiting() {
                    tokio::task::yield_now().await;
                }
                gate.decide(true)
            })
        };

        let events = agent.run("do it").collect().await;
        assert!(approver.await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolResult { output, .. } if output.contains("counter ran"))));
    }

    #[tokio::test]
    async fn denial_records_marker_and_skips_tool() {
        let provider = ScriptedProvider::new(vec![
            vec![Ok(tool_frag(0, Some("c1"), Some("counter"), "{}"))],
            vec![Ok(text("understood"))],
        ]);
        let (tools, calls) = registry(true);
        let mut agent = agent(provider, tools).with_confirm_dangerous(true);
        agent.confirmation_gate().decide(false);

        let events = agent.run("do it").collect().await;
        assert!(events.iter().any(|e| matches!(e, AgentEvent::ToolResult { output, .. } if output == DENIAL_MARKER)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(agent.messages().iter().any(|m| m.role == Role::Tool && m.text() == DENIAL_MARKER));
    }

    #[tokio::test]
    async fn dangerous_tool_runs_without_gate_when_disabled() {
        let provider = ScriptedProvider::new(vec![
            vec![Ok(tool_frag(0, Some("c1"), Some("counter"), "{}"))],
            vec![Ok(text("ok"))],
        ]);
        let (tools, calls) = registry(true);
        let mut agent = agent(provider, tools);

        let events = agent.run("do it").collect().await;
        assert!(!events.iter().any(|e| matches!(e, AgentEvent::ConfirmationRequested { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_and_load_messages() {
        let provider = ScriptedProvider::new(vec![vec![Ok(text("hi")), Ok(usage(4))]]);
        let (tools, _) = registry(false);
        let mut agent = agent(provider, tools);
        agent.run("hello").collect().await;
        assert_eq!(agent.usage().total_tokens, 4);

        agent.reset();
        assert_eq!(agent.usage().total_tokens, 0);
        assert_eq!(agent.messages().len(), 1);

        agent.load_messages(vec![Message::user("old"), Message::assistant("reply")], true);
        let msgs = agent.messages();
        assert_eq!(msgs[0].text(), "You are a test agent");
        assert_eq!(msgs.last().unwrap().text(), CONTINUE_REMINDER);

        agent.load_messages(Vec::new(), false);
        assert_eq!(agent.messages().len(), 1);
    }
}
