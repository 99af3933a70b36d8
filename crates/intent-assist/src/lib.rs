//! Assistance layer on top of the belief filters: recommends actions from the current
//! belief, arbitrates between the operator and the recommendation, and lets the operator
//! pick the inference method.

pub mod arbitration;
pub mod error;
pub mod menu;
pub mod selector;
pub mod session;

pub use arbitration::{ActionSource, Arbiter, Arbitration, ArbitrationOutcome, belief_confidence};
pub use error::AssistError;
pub use menu::{
    MenuError, OptionMenu, ScriptedMenu, TerminalMenu, choose_arbitration, choose_inference,
};
pub use selector::{ActionSelector, Selection};
pub use session::{AssistSession, AssistStep};
