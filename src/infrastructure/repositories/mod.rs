pub mod in_memory;

pub use in_memory::{
    InMemoryConditionalOrderRepository, InMemoryPositionRepository, InMemoryStopOrderRepository,
    InMemoryStopPairRepository, InMemoryTrailingStopRepository,
};
