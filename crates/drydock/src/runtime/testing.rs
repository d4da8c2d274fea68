//! Scripted in-memory container runtime
//!
//! Stands in for Docker in tests. The behavior of each container is read from
//! the last argument of its command (where profiles put `{code}`):
//!
//! | code                   | behavior                                          |
//! |------------------------|---------------------------------------------------|
//! | `print:<text>`         | writes `<text>\n`, exits 0                        |
//! | `silent`               | writes nothing, exits 0                           |
//! | `fail:<n>:<text>`      | writes `<text>`, exits `n`                        |
//! | `cat`                  | writes back whatever arrived on stdin, exits 0    |
//! | `sleep:<ms>:<text>`    | writes `<text>\n` after `ms` milliseconds, exits 0 |
//! | `hang`                 | runs until stopped, then reports 137              |
//! | `vanish:<text>`        | like `print`, but removes itself once logs are read |
//! | `flood:<n>`            | writes `n` bytes of `x`, exits 0                  |
//!
//! Anything else exits 127 with an explanatory message.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::runtime::{CapturedOutput, ContainerRuntime, ContainerSpec, OutputBuffer, RuntimeError};

/// Exit status reported for a container that was killed
pub const KILLED_EXIT_CODE: i64 = 137;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Script {
    Exit {
        code: i64,
        output: Vec<u8>,
        delay: Option<Duration>,
    },
    Cat,
    Hang,
    Vanish(Vec<u8>),
}

impl Script {
    fn parse(code: &str) -> Self {
        let exit = |code, output: String, delay| Script::Exit {
            code,
            output: output.into_bytes(),
            delay,
        };

        if let Some(text) = code.strip_prefix("print:") {
            return exit(0, format!("{text}\n"), None);
        }
        if code == "silent" {
            return exit(0, String::new(), None);
        }
        if let Some(rest) = code.strip_prefix("fail:") {
            let (status, text) = rest.split_once(':').unwrap_or((rest, ""));
            return exit(status.parse().unwrap_or(1), text.to_owned(), None);
        }
        if code == "cat" {
            return Script::Cat;
        }
        if let Some(rest) = code.strip_prefix("sleep:") {
            let (ms, text) = rest.split_once(':').unwrap_or((rest, ""));
            let delay = Duration::from_millis(ms.parse().unwrap_or(0));
            return exit(0, format!("{text}\n"), Some(delay));
        }
        if code == "hang" {
            return Script::Hang;
        }
        if let Some(text) = code.strip_prefix("vanish:") {
            return Script::Vanish(format!("{text}\n").into_bytes());
        }
        if let Some(n) = code.strip_prefix("flood:") {
            return exit(0, "x".repeat(n.parse().unwrap_or(0)), None);
        }
        exit(127, format!("unknown script: {code}"), None)
    }
}

#[derive(Debug)]
struct Container {
    script: Script,
    started: bool,
    stdin: Option<Vec<u8>>,
    stopped: watch::Sender<bool>,
}

/// In-memory [`ContainerRuntime`] that records every call
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    containers: Mutex<HashMap<String, Container>>,
    created_specs: Mutex<Vec<ContainerSpec>>,
    missing_images: Mutex<HashSet<String>>,
    fail_start: Mutex<bool>,
    stop_delay: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
    created: AtomicUsize,
    removed: AtomicUsize,
    stopped: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create` fail for this image, as if it could not be pulled
    pub fn with_missing_image(self, image: impl Into<String>) -> Self {
        self.missing_images
            .lock()
            .expect("lock poisoned")
            .insert(image.into());
        self
    }

    /// Make every `start` fail after a successful `create`
    pub fn with_failing_start(self) -> Self {
        *self.fail_start.lock().expect("lock poisoned") = true;
        self
    }

    /// Make every `stop` take this long before it signals the container
    pub fn with_stop_delay(self, delay: Duration) -> Self {
        *self.stop_delay.lock().expect("lock poisoned") = Some(delay);
        self
    }

    /// Ids of containers that were created and not yet removed
    pub fn live(&self) -> Vec<String> {
        self.containers
            .lock()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn removed_count(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn stopped_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Specs of every container ever created, in creation order
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.created_specs.lock().expect("lock poisoned").clone()
    }

    /// Give spawned teardown tasks a chance to run
    pub async fn settle(&self) {
        for _ in 0..100 {
            if self.live().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn with_container<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Container) -> T,
    ) -> Result<T, RuntimeError> {
        let mut containers = self.containers.lock().expect("lock poisoned");
        containers
            .get_mut(id)
            .map(f)
            .ok_or_else(|| RuntimeError::NotFound(id.to_owned()))
    }
}

/// Resolves once the container is stopped or removed
async fn until_stopped(mut rx: watch::Receiver<bool>) {
    loop {
        let stopped = *rx.borrow_and_update();
        if stopped {
            return;
        }
        // Sender dropped means the container was removed
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let missing = self
            .missing_images
            .lock()
            .expect("lock poisoned")
            .contains(spec.image());
        if missing {
            return Err(RuntimeError::CreateFailed {
                image: spec.image().to_owned(),
                message: "No such image".to_owned(),
            });
        }

        let code = spec.argv().last().map(String::as_str).unwrap_or_default();
        let id = format!("scripted-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (stopped, _) = watch::channel(false);
        let container = Container {
            script: Script::parse(code),
            started: false,
            stdin: None,
            stopped,
        };

        self.containers
            .lock()
            .expect("lock poisoned")
            .insert(id.clone(), container);
        self.created_specs
            .lock()
            .expect("lock poisoned")
            .push(spec.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        let fail = *self.fail_start.lock().expect("lock poisoned");
        if fail {
            return Err(RuntimeError::StartFailed {
                id: id.to_owned(),
                message: "scripted start failure".to_owned(),
            });
        }
        self.with_container(id, |c| c.started = true)
    }

    async fn write_stdin(&self, id: &str, input: &[u8]) -> Result<(), RuntimeError> {
        self.with_container(id, |c| c.stdin = Some(input.to_vec()))
    }

    async fn wait(&self, id: &str) -> Result<i64, RuntimeError> {
        let (script, stopped, started) = self.with_container(id, |c| {
            (c.script.clone(), c.stopped.subscribe(), c.started)
        })?;
        if !started {
            return Err(RuntimeError::WaitFailed {
                id: id.to_owned(),
                message: "container is not running".to_owned(),
            });
        }

        match script {
            Script::Exit { code, delay, .. } => {
                if let Some(delay) = delay {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => Ok(code),
                        _ = until_stopped(stopped) => Ok(KILLED_EXIT_CODE),
                    }
                } else {
                    Ok(code)
                }
            }
            Script::Cat | Script::Vanish(_) => Ok(0),
            Script::Hang => {
                until_stopped(stopped).await;
                Ok(KILLED_EXIT_CODE)
            }
        }
    }

    async fn logs(&self, id: &str, limit: Option<usize>) -> Result<CapturedOutput, RuntimeError> {
        let (script, stdin) = self.with_container(id, |c| (c.script.clone(), c.stdin.clone()))?;

        let mut buffer = OutputBuffer::new(limit);
        match script {
            Script::Exit { output, .. } => buffer.push(&output),
            Script::Cat => buffer.push(&stdin.unwrap_or_default()),
            Script::Hang => {}
            Script::Vanish(output) => {
                buffer.push(&output);
                self.containers.lock().expect("lock poisoned").remove(id);
            }
        }
        Ok(buffer.finish())
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        let delay = *self.stop_delay.lock().expect("lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.with_container(id, |c| {
            c.stopped.send_replace(true);
        })?;
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), RuntimeError> {
        let removed = self.containers.lock().expect("lock poisoned").remove(id);
        match removed {
            Some(container) => {
                container.stopped.send_replace(true);
                self.removed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(RuntimeError::NotFound(id.to_owned())),
        }
    }

    async fn list_managed(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.live())
    }
}
