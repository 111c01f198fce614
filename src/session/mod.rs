mod credential;
mod profile;
mod store;

pub use credential::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use profile::{
    PermissionSet, Role, UserProfile, ADMIN_ROLE_KEY, ALL_PERMISSIONS, SENIOR_ROLE_SORT,
    TEAM_LEADER_ROLE_KEY, VIEW_OTHERS_PERMISSION,
};
pub use store::SessionStore;
