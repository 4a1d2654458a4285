/*!
Test support for tx-dispatch: an in-memory ledger with fault injection,
scripted wallets and fixed-shape operation fixtures.
*/

mod fixtures;
mod signers;
mod simulated_ledger;

pub use fixtures::*;
pub use signers::{CountingSigner, RefusingSigner, SlowSigner};
pub use simulated_ledger::{LedgerBehavior, SimulatedLedger, SIMULATED_FAILURE};
