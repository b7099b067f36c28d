mod cli_test;
mod process_test;
