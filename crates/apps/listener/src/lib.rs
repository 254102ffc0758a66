pub mod backfill;
pub mod handlers;
pub mod listener;
pub mod minio;
pub mod notification;
