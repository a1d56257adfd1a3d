//! 编排引擎：运行历史、过程事件、plan→act→observe→reflect 主循环

pub mod events;
pub mod history;
pub mod loop_;

pub use events::RunEvent;
pub use history::{last_failed_code, History, Turn, TurnPayload, TurnRole};
pub use loop_::{run_loop, RunSession};
