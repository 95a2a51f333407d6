pub mod stick;
