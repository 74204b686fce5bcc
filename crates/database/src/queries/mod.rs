//! Database query operations organized by entity

pub mod tasks;

pub use tasks::{
    clear_tasks, count_tasks, delete_path_tasks, delete_task, insert_task, load_tasks,
    TaskFilter,
};
