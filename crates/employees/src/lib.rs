//! Employee directory domain module.
//!
//! Business rules for employee records, implemented as pure domain logic
//! (no IO, no HTTP, no storage).

pub mod employee;

pub use employee::{Department, Employee, EmployeeFilter, EmployeePatch, EmployeeRole, NewEmployee};
