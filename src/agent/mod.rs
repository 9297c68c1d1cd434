//! The LLM Agent bridge: a single background worker thread draining a
//! command queue and posting results to a response queue, merged into the
//! fuzzing loop only at iteration boundaries so a slow LLM call never stalls
//! request dispatch.

pub mod transport;

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use crate::sequence::Sequence;
use crate::spec::Method;
use transport::LlmTransport;

pub enum Command {
    Initialize,
    GenerateSequence { methods: Vec<Method> },
    GeneratePlainInstance { methods: Vec<Method> },
}

pub enum AgentResult {
    Initialized,
    Sequences(Vec<Sequence>),
    /// `(operation_id, request body)` pairs proposed by the agent.
    PlainInstances(Vec<(String, serde_json::Value)>),
    Failed(String),
}

pub struct Agent {
    commands: Sender<Command>,
    results: Receiver<AgentResult>,
    // Kept only so the worker thread is abandoned (not panicked on) at
    // process exit; the agent's contract has no cancellation path.
    _worker: JoinHandle<()>,
}

impl Agent {
    pub fn start(transport: Box<dyn LlmTransport + Send>) -> Self {
        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (result_tx, result_rx) = mpsc::channel::<AgentResult>();

        let worker = std::thread::spawn(move || {
            let mut conversation_id: Option<String> = None;
            while let Ok(command) = command_rx.recv() {
                let result = handle_command(transport.as_ref(), &mut conversation_id, command);
                if result_tx.send(result).is_err() {
                    break;
                }
            }
        });

        Agent {
            commands: command_tx,
            results: result_rx,
            _worker: worker,
        }
    }

    /// Enqueues a command without blocking the caller.
    pub fn submit(&self, command: Command) {
        let _ = self.commands.send(command);
    }

    /// Drains every result currently available, without blocking. Intended
    /// to be called once per fuzz iteration so the agent's latency never
    /// gates a single sequence's execution.
    pub fn drain(&self) -> Vec<AgentResult> {
        self.results.try_iter().collect()
    }
}

fn handle_command(
    transport: &(dyn LlmTransport + Send),
    conversation_id: &mut Option<String>,
    command: Command,
) -> AgentResult {
    match command {
        Command::Initialize => match transport.send(transport::INIT_PROMPT, None) {
            Ok((_, conv)) => {
                *conversation_id = conv;
                AgentResult::Initialized
            }
            Err(e) => AgentResult::Failed(e.to_string()),
        },
        Command::GenerateSequence { methods } => {
            let prompt = transport::sequence_generation_prompt(&methods);
            match transport.send(&prompt, conversation_id.as_deref()) {
                Ok((text, _)) => AgentResult::Sequences(transport::parse_sequences(&text, &methods)),
                Err(e) => AgentResult::Failed(e.to_string()),
            }
        }
        Command::GeneratePlainInstance { methods } => {
            let prompt = transport::plain_instance_prompt(&methods);
            match transport.send(&prompt, conversation_id.as_deref()) {
                Ok((text, _)) => {
                    AgentResult::PlainInstances(transport::parse_plain_instances(&text, &methods))
                }
                Err(e) => AgentResult::Failed(e.to_string()),
            }
        }
    }
}
