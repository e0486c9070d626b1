mod caches;
mod lookup;

pub use caches::caches_router;
pub use lookup::lookup_router;
