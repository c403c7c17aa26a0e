pub mod backup_driver;
pub mod backup_operation;
pub mod backup_runner;
pub mod media_repository;
pub mod source_fetcher;
pub mod storage;
pub mod url_resolver;
pub mod worker;
