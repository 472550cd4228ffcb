pub mod checker;
pub mod history;
pub mod replay;
pub mod scorer;
pub mod simulator;
pub mod snapshot;
