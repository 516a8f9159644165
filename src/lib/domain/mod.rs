pub mod commitment;
pub mod deposit;
pub mod events;
pub mod merkle;
pub mod nullifier;
pub mod proof;
pub mod root_history;
pub mod witness;
