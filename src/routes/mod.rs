mod auth;
mod centers;
mod health_check;
mod invitations;

pub use auth::{forgot_password, get_current_user, login, register, reset_password};
pub use centers::{create_center, get_center, get_states, list_centers, update_center};
pub use health_check::health_check;
pub use invitations::{issue as issue_invitation, lookup as lookup_invitation};
