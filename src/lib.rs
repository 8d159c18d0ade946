// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace root crate. Carries no runtime code of its own — it exists so
//! `tests/` can exercise `mew-gateway-core` and `mew-participant` together
//! as a black box, the way a deployed `mewd` and its connected participants
//! would. See the member crates under `crates/` for the actual gateway.
