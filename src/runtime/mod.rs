pub mod background;
pub mod bus;
pub mod page;

pub use background::Background;
pub use bus::{StoreHandle, StoreSnapshot, TransportError};
pub use page::{PageContext, PageHandle, PageOptions, PageSnapshot};
