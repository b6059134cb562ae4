pub mod submission_repository;
