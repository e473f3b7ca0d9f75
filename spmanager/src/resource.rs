//! Resource budgets for capacity-aware task selection.
//!
//! Executors poll the manager with the resources they currently have free.
//! Limit-aware queues only hand out tasks whose estimated cost fits inside
//! that budget, so a busy executor is never given work it cannot start.
//!
//! # Resource Types
//!
//! - [`ResourceType::Memory`]: bytes of buffer memory
//! - [`ResourceType::Connections`]: concurrent network connections
//! - [`ResourceType::DiskIo`]: disk IO tokens
//! - [`ResourceType::Cpu`]: CPU share in whole tasks
//!
//! # Example
//!
//! ```
//! use spmanager::resource::ResourceBudget;
//!
//! let executor = ResourceBudget::new(64 << 20, 16, 8, 4);
//! let replicate = ResourceBudget::new(32 << 20, 6, 1, 1);
//!
//! assert!(executor.not_less(&replicate));
//! assert!(!replicate.not_less(&executor));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Default Executor Budget
// =============================================================================

/// Default memory budget for an executor (1 GiB).
pub const DEFAULT_MEMORY_BYTES: u64 = 1 << 30;

/// Default concurrent connection budget for an executor.
pub const DEFAULT_CONNECTIONS: u64 = 256;

/// Default disk IO token budget for an executor.
pub const DEFAULT_DISK_IO: u64 = 64;

/// Default CPU budget for an executor.
pub const DEFAULT_CPU: u64 = 16;

// =============================================================================
// Resource Type
// =============================================================================

/// Resource dimensions tracked by a [`ResourceBudget`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ResourceType {
    /// Buffer memory in bytes.
    Memory,
    /// Concurrent network connections.
    Connections,
    /// Disk IO tokens.
    DiskIo,
    /// CPU share.
    Cpu,
}

impl ResourceType {
    /// All resource types in budget order.
    pub const ALL: [ResourceType; 4] = [
        ResourceType::Memory,
        ResourceType::Connections,
        ResourceType::DiskIo,
        ResourceType::Cpu,
    ];
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "Memory"),
            Self::Connections => write!(f, "Connections"),
            Self::DiskIo => write!(f, "DiskIO"),
            Self::Cpu => write!(f, "CPU"),
        }
    }
}

// =============================================================================
// Resource Budget
// =============================================================================

/// An ordered vector of per-resource ceilings.
///
/// Used both as the free capacity an executor reports and as the estimated
/// cost of a single task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceBudget {
    /// Memory bytes.
    pub memory: u64,
    /// Concurrent connections.
    pub connections: u64,
    /// Disk IO tokens.
    pub disk_io: u64,
    /// CPU share.
    pub cpu: u64,
}

impl ResourceBudget {
    /// Creates a budget from its four components.
    pub const fn new(memory: u64, connections: u64, disk_io: u64, cpu: u64) -> Self {
        Self {
            memory,
            connections,
            disk_io,
            cpu,
        }
    }

    /// A budget with every component at zero.
    pub const fn zero() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// A budget that fits any task.
    pub const fn unlimited() -> Self {
        Self::new(u64::MAX, u64::MAX, u64::MAX, u64::MAX)
    }

    /// Returns the component for a resource type.
    pub fn get(&self, resource: ResourceType) -> u64 {
        match resource {
            ResourceType::Memory => self.memory,
            ResourceType::Connections => self.connections,
            ResourceType::DiskIo => self.disk_io,
            ResourceType::Cpu => self.cpu,
        }
    }

    /// Returns true iff every component of `self` is at least the
    /// corresponding component of `other`.
    pub fn not_less(&self, other: &ResourceBudget) -> bool {
        ResourceType::ALL
            .iter()
            .all(|r| self.get(*r) >= other.get(*r))
    }

    /// Returns the first resource type for which `self` falls short of `other`.
    pub fn first_shortfall(&self, other: &ResourceBudget) -> Option<ResourceType> {
        ResourceType::ALL
            .into_iter()
            .find(|r| self.get(*r) < other.get(*r))
    }
}

impl fmt::Display for ResourceBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory:{} connections:{} disk_io:{} cpu:{}",
            self.memory, self.connections, self.disk_io, self.cpu
        )
    }
}

/// Default budget for a single executor when none is configured.
pub fn default_executor_budget() -> ResourceBudget {
    ResourceBudget::new(
        DEFAULT_MEMORY_BYTES,
        DEFAULT_CONNECTIONS,
        DEFAULT_DISK_IO,
        DEFAULT_CPU,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_less_requires_every_component() {
        let budget = ResourceBudget::new(100, 10, 10, 10);

        assert!(budget.not_less(&ResourceBudget::new(100, 10, 10, 10)));
        assert!(budget.not_less(&ResourceBudget::zero()));
        assert!(!budget.not_less(&ResourceBudget::new(101, 0, 0, 0)));
        assert!(!budget.not_less(&ResourceBudget::new(0, 0, 0, 11)));
    }

    #[test]
    fn test_first_shortfall() {
        let budget = ResourceBudget::new(100, 1, 10, 10);
        let cost = ResourceBudget::new(50, 2, 20, 0);

        assert_eq!(
            budget.first_shortfall(&cost),
            Some(ResourceType::Connections)
        );
        assert_eq!(budget.first_shortfall(&ResourceBudget::zero()), None);
    }

    #[test]
    fn test_unlimited_fits_everything() {
        let cost = ResourceBudget::new(u64::MAX, 1, 1, 1);
        assert!(ResourceBudget::unlimited().not_less(&cost));
    }

    #[test]
    fn test_display() {
        let budget = ResourceBudget::new(1, 2, 3, 4);
        assert_eq!(budget.to_string(), "memory:1 connections:2 disk_io:3 cpu:4");
        assert_eq!(ResourceType::DiskIo.to_string(), "DiskIO");
    }
}
