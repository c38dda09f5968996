//! Message catalog (C3): the closed incoming/outgoing message kind
//! enumerations, and the static "has a message-version prefix" set.
//!
//! Kind names and wire integers are carried over verbatim from the
//! prior Rust port's `IncomingMessageIds`/`OutgoingMessageIds` (see
//! DESIGN.md). Only kinds this client's feature handlers actually wire
//! up get a registered decoder; the rest of the catalog is declared but
//! unused, matching the scanner/news/FA Non-goals.

use crate::error::ProtocolError;

/// Incoming message kinds, keyed by their wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Incoming {
    TickPrice = 1,
    TickSize = 2,
    OrderStatus = 3,
    ErrMsg = 4,
    OpenOrder = 5,
    AcctValue = 6,
    PortfolioValue = 7,
    AcctUpdateTime = 8,
    NextValidId = 9,
    ContractData = 10,
    ExecutionData = 11,
    MarketDepth = 12,
    MarketDepthL2 = 13,
    NewsBulletins = 14,
    ManagedAccts = 15,
    ReceiveFa = 16,
    HistoricalData = 17,
    BondContractData = 18,
    ScannerParameters = 19,
    ScannerData = 20,
    TickOptionComputation = 21,
    TickGeneric = 45,
    TickString = 46,
    TickEfp = 47,
    CurrentTime = 49,
    RealTimeBars = 50,
    FundamentalData = 51,
    ContractDataEnd = 52,
    OpenOrderEnd = 53,
    AcctDownloadEnd = 54,
    ExecutionDataEnd = 55,
    DeltaNeutralValidation = 56,
    TickSnapshotEnd = 57,
    MarketDataType = 58,
    CommissionReport = 59,
    PositionData = 61,
    PositionEnd = 62,
    AccountSummary = 63,
    AccountSummaryEnd = 64,
    VerifyMessageApi = 65,
    VerifyCompleted = 66,
    DisplayGroupList = 67,
    DisplayGroupUpdated = 68,
    VerifyAndAuthMessageApi = 69,
    VerifyAndAuthCompleted = 70,
    PositionMulti = 71,
    PositionMultiEnd = 72,
    AccountUpdateMulti = 73,
    AccountUpdateMultiEnd = 74,
    SecurityDefinitionOptionParameter = 75,
    SecurityDefinitionOptionParameterEnd = 76,
    SoftDollarTiers = 77,
    FamilyCodes = 78,
    SymbolSamples = 79,
    MktDepthExchanges = 80,
    TickReqParams = 81,
    SmartComponents = 82,
    NewsArticle = 83,
    TickNews = 84,
    NewsProviders = 85,
    HistoricalNews = 86,
    HistoricalNewsEnd = 87,
    HeadTimestamp = 88,
    HistogramData = 89,
    HistoricalDataUpdate = 90,
    RerouteMktDataReq = 91,
    RerouteMktDepthReq = 92,
    MarketRule = 93,
    Pnl = 94,
    PnlSingle = 95,
    HistoricalTicks = 96,
    HistoricalTicksBidAsk = 97,
    HistoricalTicksLast = 98,
    TickByTick = 99,
    OrderBound = 100,
    CompletedOrder = 101,
    CompletedOrdersEnd = 102,
}

impl Incoming {
    pub fn from_wire(value: i32) -> Result<Self, ProtocolError> {
        use Incoming::*;
        Ok(match value {
            1 => TickPrice,
            2 => TickSize,
            3 => OrderStatus,
            4 => ErrMsg,
            5 => OpenOrder,
            6 => AcctValue,
            7 => PortfolioValue,
            8 => AcctUpdateTime,
            9 => NextValidId,
            10 => ContractData,
            11 => ExecutionData,
            12 => MarketDepth,
            13 => MarketDepthL2,
            14 => NewsBulletins,
            15 => ManagedAccts,
            16 => ReceiveFa,
            17 => HistoricalData,
            18 => BondContractData,
            19 => ScannerParameters,
            20 => ScannerData,
            21 => TickOptionComputation,
            45 => TickGeneric,
            46 => TickString,
            47 => TickEfp,
            49 => CurrentTime,
            50 => RealTimeBars,
            51 => FundamentalData,
            52 => ContractDataEnd,
            53 => OpenOrderEnd,
            54 => AcctDownloadEnd,
            55 => ExecutionDataEnd,
            56 => DeltaNeutralValidation,
            57 => TickSnapshotEnd,
            58 => MarketDataType,
            59 => CommissionReport,
            61 => PositionData,
            62 => PositionEnd,
            63 => AccountSummary,
            64 => AccountSummaryEnd,
            65 => VerifyMessageApi,
            66 => VerifyCompleted,
            67 => DisplayGroupList,
            68 => DisplayGroupUpdated,
            69 => VerifyAndAuthMessageApi,
            70 => VerifyAndAuthCompleted,
            71 => PositionMulti,
            72 => PositionMultiEnd,
            73 => AccountUpdateMulti,
            74 => AccountUpdateMultiEnd,
            75 => SecurityDefinitionOptionParameter,
            76 => SecurityDefinitionOptionParameterEnd,
            77 => SoftDollarTiers,
            78 => FamilyCodes,
            79 => SymbolSamples,
            80 => MktDepthExchanges,
            81 => TickReqParams,
            82 => SmartComponents,
            83 => NewsArticle,
            84 => TickNews,
            85 => NewsProviders,
            86 => HistoricalNews,
            87 => HistoricalNewsEnd,
            88 => HeadTimestamp,
            89 => HistogramData,
            90 => HistoricalDataUpdate,
            91 => RerouteMktDataReq,
            92 => RerouteMktDepthReq,
            93 => MarketRule,
            94 => Pnl,
            95 => PnlSingle,
            96 => HistoricalTicks,
            97 => HistoricalTicksBidAsk,
            98 => HistoricalTicksLast,
            99 => TickByTick,
            100 => OrderBound,
            101 => CompletedOrder,
            102 => CompletedOrdersEnd,
            other => return Err(ProtocolError::UnknownMessageKind(other)),
        })
    }

    /// True if this kind's incoming frame carries an extra integer
    /// "message version" field immediately after the kind field.
    ///
    /// The source enumerates this as a dictionary; we ship it verbatim
    /// here. See DESIGN.md for how membership was reconstructed for the
    /// kinds not exercised by a worked wire example.
    pub fn has_message_version(self) -> bool {
        use Incoming::*;
        matches!(
            self,
            TickPrice
                | TickSize
                | OrderStatus
                | ErrMsg
                | OpenOrder
                | AcctValue
                | PortfolioValue
                | AcctUpdateTime
                | NextValidId
                | ContractData
                | ExecutionData
                | MarketDepth
                | MarketDepthL2
                | NewsBulletins
                | ManagedAccts
                | ReceiveFa
                | HistoricalData
                | BondContractData
                | ScannerParameters
                | ScannerData
                | TickOptionComputation
                | CurrentTime
                | RealTimeBars
                | FundamentalData
        )
    }
}

/// Outgoing message kinds, keyed by their wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Outgoing {
    ReqMktData = 1,
    CancelMktData = 2,
    PlaceOrder = 3,
    CancelOrder = 4,
    ReqOpenOrders = 5,
    ReqAcctData = 6,
    ReqExecutions = 7,
    ReqIds = 8,
    ReqContractData = 9,
    ReqMktDepth = 10,
    CancelMktDepth = 11,
    ReqNewsBulletins = 12,
    CancelNewsBulletins = 13,
    SetServerLoglevel = 14,
    ReqAutoOpenOrders = 15,
    ReqAllOpenOrders = 16,
    ReqManagedAccts = 17,
    ReqFa = 18,
    ReplaceFa = 19,
    ReqHistoricalData = 20,
    ExerciseOptions = 21,
    ReqScannerSubscription = 22,
    CancelScannerSubscription = 23,
    ReqScannerParameters = 24,
    CancelHistoricalData = 25,
    ReqCurrentTime = 49,
    ReqRealTimeBars = 50,
    CancelRealTimeBars = 51,
    ReqFundamentalData = 52,
    CancelFundamentalData = 53,
    ReqCalcImpliedVolat = 54,
    ReqCalcOptionPrice = 55,
    CancelCalcImpliedVolat = 56,
    CancelCalcOptionPrice = 57,
    ReqGlobalCancel = 58,
    ReqMarketDataType = 59,
    ReqPositions = 61,
    ReqAccountSummary = 62,
    CancelAccountSummary = 63,
    CancelPositions = 64,
    VerifyRequest = 65,
    VerifyMessage = 66,
    QueryDisplayGroups = 67,
    SubscribeToGroupEvents = 68,
    UpdateDisplayGroup = 69,
    UnsubscribeFromGroupEvents = 70,
    StartApi = 71,
    VerifyAndAuthRequest = 72,
    VerifyAndAuthMessage = 73,
    ReqPositionsMulti = 74,
    CancelPositionsMulti = 75,
    ReqAccountUpdatesMulti = 76,
    CancelAccountUpdatesMulti = 77,
    ReqSecDefOptParams = 78,
    ReqSoftDollarTiers = 79,
    ReqFamilyCodes = 80,
    ReqMatchingSymbols = 81,
    ReqMktDepthExchanges = 82,
    ReqSmartComponents = 83,
    ReqNewsArticle = 84,
    ReqNewsProviders = 85,
    ReqHistoricalNews = 86,
    ReqHeadTimestamp = 87,
    ReqHistogramData = 88,
    CancelHistogramData = 89,
    CancelHeadTimestamp = 90,
    ReqMarketRule = 91,
    ReqPnl = 92,
    CancelPnl = 93,
    ReqPnlSingle = 94,
    CancelPnlSingle = 95,
    ReqHistoricalTicks = 96,
    ReqTickByTickData = 97,
    CancelTickByTickData = 98,
    ReqCompletedOrders = 99,
}

impl Outgoing {
    pub fn wire_id(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_wire_round_trips_known_kinds() {
        assert_eq!(Incoming::from_wire(49).unwrap(), Incoming::CurrentTime);
        assert_eq!(Incoming::from_wire(79).unwrap(), Incoming::SymbolSamples);
        assert_eq!(Incoming::from_wire(12).unwrap(), Incoming::MarketDepth);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(matches!(
            Incoming::from_wire(9999),
            Err(ProtocolError::UnknownMessageKind(9999))
        ));
    }

    #[test]
    fn symbol_samples_has_no_message_version() {
        // A worked incoming frame ["79","43","1","42","AAPL",...] decodes
        // request_id=43 directly from the field after the kind -- if
        // SYMBOL_SAMPLES carried a message version, "43" would be
        // misinterpreted as the version and request_id would be wrong.
        assert!(!Incoming::SymbolSamples.has_message_version());
    }

    #[test]
    fn current_time_has_message_version() {
        // A worked incoming frame ["49","1","1524957956"] resolves to
        // 1524957956, which only works if "1" is consumed as the message
        // version and "1524957956" is the actual payload field.
        assert!(Incoming::CurrentTime.has_message_version());
    }

    #[test]
    fn wire_id_matches_outgoing_enum_value() {
        assert_eq!(Outgoing::ReqCurrentTime.wire_id(), 49);
        assert_eq!(Outgoing::ReqMatchingSymbols.wire_id(), 81);
    }
}
