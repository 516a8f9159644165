pub mod abi;
pub mod checkpoint;
pub mod ethereum;
pub mod memory_chain;
pub mod mock_prover;
pub mod snarkjs_prover;
