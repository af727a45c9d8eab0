//! End-to-end delivery scenarios against the scripted ledger.

mod assembly_scenarios;
mod delivery_scenarios;
