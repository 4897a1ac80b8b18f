//! Lifecycle scenarios driven through scripted collaborators.

mod bdd_steps;
mod scenarios;
mod test_helpers;
