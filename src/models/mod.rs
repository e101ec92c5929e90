mod id;
mod market;
mod page;
mod points;

pub use id::{AssetId, IdError, MarketId, MarketKey};
pub use market::{DiscoveredMarket, Market, MarketFilter};
pub use page::Page;
pub use points::{MarketBalancePoint, MarketPricePoint};
