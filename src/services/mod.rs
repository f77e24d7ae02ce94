pub mod aws_cli;
pub mod check_suite;
pub mod s3_probe;
