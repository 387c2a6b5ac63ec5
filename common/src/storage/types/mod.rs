pub mod ingestion_task;
