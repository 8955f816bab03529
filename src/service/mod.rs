//! Services: generic catalog CRUD, the person aggregate and user accounts.

pub mod constraint;
mod crud;
pub mod person;
pub mod rows;
pub mod users;
mod validation;
pub use crud::CrudService;
pub use person::{PersonPayload, PersonService};
pub use users::{NewUser, User, UserStore, UserUpdate};
pub use validation::RequestValidator;
