/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

/// Reserved actor id under which definition content is sealed at rest
pub const SYSTEM_ACTOR: &str = "system";
