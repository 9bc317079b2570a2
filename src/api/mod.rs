// api/mod.rs - Building blocks shared by the resource handlers
pub mod controller; // ReadOnlyResource, RepositoryResource and CreateResource flows
pub mod extract; // Json and Query with enveloped rejections
pub mod paging; // page/limit normalization and Link headers
pub mod permission; // PermissionResult and bulk action results
