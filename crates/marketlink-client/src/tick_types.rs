//! Market data tick type catalog and the price/size pairing table used
//! to route a size value alongside its price tick.

/// Which timeliness of market data a subscription is receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketDataTimeliness {
    RealTime = 1,
    Frozen = 2,
    Delayed = 3,
    DelayedFrozen = 4,
}

impl MarketDataTimeliness {
    pub fn from_wire(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::RealTime,
            2 => Self::Frozen,
            3 => Self::Delayed,
            4 => Self::DelayedFrozen,
            _ => return None,
        })
    }
}

/// Bits of the price tick attribute bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAttribute {
    CanAutoExecute = 0x01,
    PastLimit = 0x02,
    PreOpen = 0x04,
}

impl TickAttribute {
    /// Expand a bitmask into the set of attributes it carries.
    pub fn list_from_int(mut value: i32) -> Vec<TickAttribute> {
        let mut result = Vec::new();
        for (bit, attr) in [
            (0x01, TickAttribute::CanAutoExecute),
            (0x02, TickAttribute::PastLimit),
            (0x04, TickAttribute::PreOpen),
        ] {
            if value & bit != 0 {
                result.push(attr);
                value -= bit;
            }
        }
        result
    }
}

/// Every tick type the gateway can report. Unknown wire integers
/// decode as `Unknown`, per the same raw-fallback rule as other
/// enumerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickType {
    BidSize,
    Bid,
    Ask,
    AskSize,
    Last,
    LastSize,
    High,
    Low,
    Volume,
    ClosePrice,
    BidOption,
    AskOption,
    LastOption,
    ModelOption,
    OpenTick,
    Low13Weeks,
    High13Weeks,
    Low26Weeks,
    High26Weeks,
    Low52Weeks,
    High52Weeks,
    AverageVolume,
    OpenInterest,
    OptionHistoricalVolatility,
    OptionImpliedVolatility,
    OptionBidExchange,
    OptionAskExchange,
    OptionCallOpenInterest,
    OptionPutOpenInterest,
    OptionCallVolume,
    OptionPutVolume,
    IndexFuturePremium,
    BidExchange,
    AskExchange,
    AuctionVolume,
    AuctionPrice,
    AuctionImbalance,
    MarkPrice,
    BidEfp,
    AskEfp,
    LastEfp,
    OpenEfp,
    HighEfp,
    LowEfp,
    CloseEfp,
    LastTimestamp,
    Shortable,
    FundamentalRatios,
    RtVolume,
    Halted,
    BidYield,
    AskYield,
    LastYield,
    CustomOption,
    TradeCount,
    TradeRate,
    VolumeRate,
    LastRthTrade,
    RtHistoricalVolatility,
    IbDividends,
    BondFactorMultiplier,
    RegulatoryImbalance,
    News,
    ShortTermVolume3Minutes,
    ShortTermVolume5Minutes,
    ShortTermVolume10Minutes,
    DelayedBid,
    DelayedAsk,
    DelayedLast,
    DelayedBidSize,
    DelayedAskSize,
    DelayedLastSize,
    DelayedHighPrice,
    DelayedLowPrice,
    DelayedVolume,
    DelayedClose,
    DelayedOpen,
    RtTradeVolume,
    CreditmanMarkPrice,
    CreditmanSlowMarkPrice,
    DelayedBidOption,
    DelayedAskOption,
    DelayedLastOption,
    DelayedModelOption,
    LastExchange,
    LastRegulatoryTime,
    AverageOptionVolume,
    DelayedLastTimestamp,
    Unknown(i32),
}

impl TickType {
    pub fn from_wire(value: i32) -> Self {
        use TickType::*;
        match value {
            0 => BidSize,
            1 => Bid,
            2 => Ask,
            3 => AskSize,
            4 => Last,
            5 => LastSize,
            6 => High,
            7 => Low,
            8 => Volume,
            9 => ClosePrice,
            10 => BidOption,
            11 => AskOption,
            12 => LastOption,
            13 => ModelOption,
            14 => OpenTick,
            15 => Low13Weeks,
            16 => High13Weeks,
            17 => Low26Weeks,
            18 => High26Weeks,
            19 => Low52Weeks,
            20 => High52Weeks,
            21 => AverageVolume,
            22 => OpenInterest,
            23 => OptionHistoricalVolatility,
            24 => OptionImpliedVolatility,
            25 => OptionBidExchange,
            26 => OptionAskExchange,
            27 => OptionCallOpenInterest,
            28 => OptionPutOpenInterest,
            29 => OptionCallVolume,
            30 => OptionPutVolume,
            31 => IndexFuturePremium,
            32 => BidExchange,
            33 => AskExchange,
            34 => AuctionVolume,
            35 => AuctionPrice,
            36 => AuctionImbalance,
            37 => MarkPrice,
            38 => BidEfp,
            39 => AskEfp,
            40 => LastEfp,
            41 => OpenEfp,
            42 => HighEfp,
            43 => LowEfp,
            44 => CloseEfp,
            45 => LastTimestamp,
            46 => Shortable,
            47 => FundamentalRatios,
            48 => RtVolume,
            49 => Halted,
            50 => BidYield,
            51 => AskYield,
            52 => LastYield,
            53 => CustomOption,
            54 => TradeCount,
            55 => TradeRate,
            56 => VolumeRate,
            57 => LastRthTrade,
            58 => RtHistoricalVolatility,
            59 => IbDividends,
            60 => BondFactorMultiplier,
            61 => RegulatoryImbalance,
            62 => News,
            63 => ShortTermVolume3Minutes,
            64 => ShortTermVolume5Minutes,
            65 => ShortTermVolume10Minutes,
            66 => DelayedBid,
            67 => DelayedAsk,
            68 => DelayedLast,
            69 => DelayedBidSize,
            70 => DelayedAskSize,
            71 => DelayedLastSize,
            72 => DelayedHighPrice,
            73 => DelayedLowPrice,
            74 => DelayedVolume,
            75 => DelayedClose,
            76 => DelayedOpen,
            77 => RtTradeVolume,
            78 => CreditmanMarkPrice,
            79 => CreditmanSlowMarkPrice,
            80 => DelayedBidOption,
            81 => DelayedAskOption,
            82 => DelayedLastOption,
            83 => DelayedModelOption,
            84 => LastExchange,
            85 => LastRegulatoryTime,
            87 => AverageOptionVolume,
            88 => DelayedLastTimestamp,
            other => Unknown(other),
        }
    }

    /// The paired size tick type that a price tick's accompanying size
    /// value should be routed to, if any. Covers the real-time and
    /// delayed Bid/Ask/Last triples.
    pub fn paired_size_tick(self) -> Option<TickType> {
        use TickType::*;
        match self {
            Bid => Some(BidSize),
            Ask => Some(AskSize),
            Last => Some(LastSize),
            DelayedBid => Some(DelayedBidSize),
            DelayedAsk => Some(DelayedAskSize),
            DelayedLast => Some(DelayedLastSize),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_bitmask_expands_all_bits() {
        let attrs = TickAttribute::list_from_int(0x05);
        assert_eq!(attrs, vec![TickAttribute::CanAutoExecute, TickAttribute::PreOpen]);
    }

    #[test]
    fn unknown_tick_type_preserves_raw_value() {
        assert_eq!(TickType::from_wire(9001), TickType::Unknown(9001));
    }

    #[test]
    fn bid_pairs_with_bid_size_including_delayed() {
        assert_eq!(TickType::Bid.paired_size_tick(), Some(TickType::BidSize));
        assert_eq!(TickType::DelayedAsk.paired_size_tick(), Some(TickType::DelayedAskSize));
        assert_eq!(TickType::Volume.paired_size_tick(), None);
    }
}
