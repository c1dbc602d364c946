pub mod book;
pub mod id;
pub mod reservation;
pub mod stats;
pub mod user;
pub mod wishlist;

pub use book::{Book, BookListOptions, BookStatus, CreateBook, UpdateBook};
pub use id::{BookId, ReservationId, UserId, WishlistId};
pub use reservation::{CancelledBy, Reservation, ReservationFilter, ReservationStatus};
pub use stats::LibraryStats;
pub use user::{CreateUser, Role, User};
pub use wishlist::WishlistEntry;
