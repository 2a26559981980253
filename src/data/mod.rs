//! Payload types that travel through the buffer pools.
//!
//! A `Request` is downloaded into a `Response`, which analyzers turn into
//! `ParsedData`: either follow-up requests or `Item`s for the pipelines.

mod item;
mod request;
mod response;

pub use item::Item;
pub use request::Request;
pub use response::Response;

/// One output of a response parser.
#[derive(Debug, Clone)]
pub enum ParsedData {
    Request(Request),
    Item(Item),
}

impl From<Request> for ParsedData {
    fn from(request: Request) -> Self {
        ParsedData::Request(request)
    }
}

impl From<Item> for ParsedData {
    fn from(item: Item) -> Self {
        ParsedData::Item(item)
    }
}
