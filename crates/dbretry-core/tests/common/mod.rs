pub mod flaky;
