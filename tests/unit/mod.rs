mod database_operations;
mod record_filter;
