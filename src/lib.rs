// ledger-core: trading ledger engine.
// ledger-first architecture: every mutation is one atomic commit against one
// account, and the balance can never go negative. spot, leveraged futures
// and fixed-time contracts share the same validate/execute/settle pipeline.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, AssetId, Side, Price, Quote, Leverage
//   2.x  config.rs: payout table, settlement policy, commit retry bound
//   3.x  position.rs: position struct, pnl, close/reduce math
//   4.x  validator.rs: admissibility rules, rejection taxonomy
//   5.x  pnl.rs: equity, total pnl, win-rate statistics
//   6.x  oracle.rs: price oracle capability (injected, never defaults to 0)
//   7.x  store.rs: snapshot-and-commit account persistence
//   8.x  events.rs: notification events, fire-and-forget sinks
//   9.x  engine/: the ledger: order execution, closes, contract settlement
//   account.rs: account state: balance, open positions, closed-trade log
//   order.rs: order requests

// core ledger modules
pub mod account;
pub mod engine;
pub mod order;
pub mod position;
pub mod types;
pub mod validator;

// derived views
pub mod pnl;

// capabilities and integration modules
pub mod config;
pub mod events;
pub mod oracle;
pub mod store;

// re exports for convenience
pub use account::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use oracle::*;
pub use order::*;
pub use pnl::*;
pub use position::*;
pub use store::*;
pub use types::*;
pub use validator::*;
