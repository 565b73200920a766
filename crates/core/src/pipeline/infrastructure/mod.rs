pub mod threaded_worker_pool;
