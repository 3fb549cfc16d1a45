//! Web worker entry point for the polychaos engine.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It owns one [`Engine`], receives [`HostMessage`] commands
//! via `postMessage`, and answers with [`WorkerMessage`]s.
//!
//! Every message in either direction is a JS object with a
//! `messageJson` string field. Frames additionally carry a `pixels`
//! `Uint8Array` of raw RGBA bytes, transferred rather than copied, to
//! avoid JSON-encoding hundreds of kilobytes of pixel data.
//!
//! While a run is active the worker executes one engine quantum per
//! zero-delay timer callback, so incoming `stop` or `reconfigure`
//! messages are handled between quanta.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use polychaos_engine::{Engine, EngineError, HostMessage, Reconfigured, WorkerMessage};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// One outgoing message, optionally followed by a frame's RGBA bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// The JSON part.
    pub message: WorkerMessage,
    /// Raw RGBA bytes for [`WorkerMessage::Frame`].
    pub pixels: Option<Vec<u8>>,
}

impl Reply {
    fn message(message: WorkerMessage) -> Self {
        Self {
            message,
            pixels: None,
        }
    }

    fn frame(engine: &mut Engine) -> Self {
        let pixels = engine.render_snapshot();
        Self {
            message: WorkerMessage::Frame {
                size: pixels.size(),
            },
            pixels: Some(pixels.to_rgba_bytes()),
        }
    }
}

/// What the timer loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// Leave any pending quantum as it is.
    Keep,
    /// Schedule a quantum (a run just started).
    Schedule,
    /// Cancel any pending quantum.
    Cancel,
}

/// Engine ownership and command dispatch, independent of the browser.
#[derive(Debug, Default)]
pub struct Session {
    engine: Option<Engine>,
}

impl Session {
    /// Apply one command and collect the replies.
    pub fn handle(&mut self, message: HostMessage) -> (Vec<Reply>, Continuation) {
        if let HostMessage::Initialize { settings, seed } = message {
            let created = match seed {
                Some(seed) => Engine::with_seed(settings, seed),
                None => Engine::new(settings),
            };
            return match created {
                Ok(mut engine) => {
                    let ready = WorkerMessage::Ready {
                        canvas_size: engine.settings().canvas_size,
                        vertices: engine.geometry().vertices().to_vec(),
                        ring_size: engine.geometry().ring_size(),
                    };
                    let replies = vec![Reply::message(ready), Reply::frame(&mut engine)];
                    self.engine = Some(engine);
                    (replies, Continuation::Cancel)
                }
                Err(err) => (vec![Reply::message(err.into())], Continuation::Keep),
            };
        }

        let Some(engine) = self.engine.as_mut() else {
            return (
                vec![Reply::message(EngineError::NotInitialized.into())],
                Continuation::Keep,
            );
        };

        match message {
            // Handled above.
            HostMessage::Initialize { .. } => (Vec::new(), Continuation::Keep),
            HostMessage::Reconfigure { settings } => match engine.reconfigure(settings) {
                Ok(kind) => {
                    let mut replies = vec![Reply::message(WorkerMessage::Reconfigured {
                        kind,
                        vertices: engine.geometry().vertices().to_vec(),
                        ring_size: engine.geometry().ring_size(),
                    })];
                    if kind != Reconfigured::CosmeticOnly {
                        replies.push(Reply::frame(engine));
                    }
                    (replies, Continuation::Keep)
                }
                Err(err) => (vec![Reply::message(err.into())], Continuation::Keep),
            },
            HostMessage::Play => {
                if engine.play() {
                    (Vec::new(), Continuation::Schedule)
                } else {
                    (Vec::new(), Continuation::Keep)
                }
            }
            HostMessage::Stop => {
                engine.stop();
                (
                    vec![Reply::message(WorkerMessage::Stopped), Reply::frame(engine)],
                    Continuation::Cancel,
                )
            }
            HostMessage::Erase => {
                engine.erase();
                (vec![Reply::frame(engine)], Continuation::Keep)
            }
            HostMessage::RenderSnapshot => (vec![Reply::frame(engine)], Continuation::Keep),
            HostMessage::Diagnostics => (
                vec![Reply::message(WorkerMessage::Diagnostics {
                    diagnostics: engine.diagnostics(),
                })],
                Continuation::Keep,
            ),
        }
    }

    /// Run one quantum if a run is active. Returns the replies and
    /// whether another quantum should follow.
    pub fn tick(&mut self) -> (Vec<Reply>, bool) {
        let Some(engine) = self.engine.as_mut() else {
            return (Vec::new(), false);
        };
        let budget = engine.tuning().time_budget;
        let quantum = engine.run_quantum(budget);
        let mut replies: Vec<Reply> = quantum
            .events
            .iter()
            .map(|&event| Reply::message(event.into()))
            .collect();
        if quantum.render_requested {
            replies.push(Reply::frame(engine));
        }
        (replies, quantum.should_continue())
    }
}

/// Session plus the pending quantum timer.
#[derive(Default)]
struct WorkerState {
    session: Session,
    pending: Option<Timeout>,
}

type Shared = Rc<RefCell<WorkerState>>;

/// # Worker entry point
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let shared: Shared = Rc::default();
    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(&shared, &event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // leak: lives for the worker lifetime
}

/// Decode an incoming message, dispatch it, and post the replies.
fn handle_message(shared: &Shared, event: &web_sys::MessageEvent) {
    let message = match decode(&event.data()) {
        Ok(message) => message,
        Err(err) => {
            log::warn!("{err}");
            post(&Reply::message(err.into()));
            return;
        }
    };

    let (replies, continuation) = shared.borrow_mut().session.handle(message);
    for reply in &replies {
        post(reply);
    }
    match continuation {
        Continuation::Keep => {}
        Continuation::Schedule => schedule_quantum(shared),
        Continuation::Cancel => {
            // Dropping a `Timeout` clears it.
            let pending = shared.borrow_mut().pending.take();
            drop(pending);
        }
    }
}

/// Extract and parse the `messageJson` field.
fn decode(data: &JsValue) -> Result<HostMessage, EngineError> {
    let json = js_sys::Reflect::get(data, &JsValue::from_str("messageJson"))
        .ok()
        .and_then(|value| value.as_string())
        .ok_or_else(|| {
            EngineError::MalformedMessage("message has no messageJson string".to_string())
        })?;
    parse_message(&json)
}

fn parse_message(json: &str) -> Result<HostMessage, EngineError> {
    serde_json::from_str(json)
        .map_err(|e| EngineError::MalformedMessage(format!("failed to parse message: {e}")))
}

/// Queue the next quantum behind any pending browser events.
fn schedule_quantum(shared: &Shared) {
    let next = Rc::clone(shared);
    let timeout = Timeout::new(0, move || run_quantum(&next));
    shared.borrow_mut().pending = Some(timeout);
}

/// Timer callback: run one quantum and reschedule while running.
fn run_quantum(shared: &Shared) {
    let fired = shared.borrow_mut().pending.take();
    drop(fired);

    let (replies, again) = shared.borrow_mut().session.tick();
    for reply in &replies {
        post(reply);
    }
    if again {
        schedule_quantum(shared);
    }
}

/// Post one reply to the main thread.
fn post(reply: &Reply) {
    let json = match serde_json::to_string(&reply.message) {
        Ok(json) => json,
        Err(e) => {
            log::error!("failed to serialize {:?}: {e}", reply.message);
            return;
        }
    };

    let response = js_sys::Object::new();
    set_field(&response, "messageJson", &JsValue::from_str(&json));
    let transfer = js_sys::Array::new();
    if let Some(ref bytes) = reply.pixels {
        let pixels = js_sys::Uint8Array::from(bytes.as_slice());
        transfer.push(&pixels.buffer());
        set_field(&response, "pixels", &pixels);
    }

    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>()
        && let Err(e) = global.post_message_with_transfer(&response, &transfer)
    {
        log::error!("postMessage failed: {e:?}");
    }
}

fn set_field(target: &js_sys::Object, key: &str, value: &JsValue) {
    if let Err(e) = js_sys::Reflect::set(target, &JsValue::from_str(key), value) {
        log::error!("failed to set {key} on reply: {e:?}");
    }
}

/// `log` backend writing to the browser console.
struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!(
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args(),
        ));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug => web_sys::console::debug_1(&line),
            log::Level::Trace => web_sys::console::log_1(&line),
        }
    }

    fn flush(&self) {}
}
