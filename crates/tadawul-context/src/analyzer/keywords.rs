//! Term lists used by the lexical analyzer
//!
//! Plain lists count occurrences; `(term, label)` pairs additionally report a
//! canonical label so English and Arabic mentions collapse to one name.

pub(crate) mod keywords_en {
    pub const BULLISH: &[&str] = &[
        "bullish",
        "buy",
        "growth",
        "gain",
        "gains",
        "rally",
        "upside",
        "outperform",
        "strong",
        "rise",
        "rising",
        "up",
        "positive",
        "breakout",
        "beat",
        "upgrade",
    ];

    pub const BEARISH: &[&str] = &[
        "bearish",
        "sell",
        "decline",
        "drop",
        "loss",
        "losses",
        "downside",
        "underperform",
        "weak",
        "fall",
        "falling",
        "down",
        "negative",
        "crash",
        "miss",
        "downgrade",
    ];

    pub const HIGH_RISK: &[&str] = &[
        "volatile",
        "volatility",
        "speculative",
        "risky",
        "high risk",
        "uncertain",
        "uncertainty",
        "bubble",
        "default",
    ];

    pub const LOW_RISK: &[&str] = &[
        "stable",
        "safe",
        "defensive",
        "low risk",
        "conservative",
        "blue chip",
    ];

    pub const HEDGING: &[&str] = &["hedge", "hedging", "diversify", "diversification", "diversified"];

    pub const LEVERAGE: &[&str] = &["leverage", "leveraged", "margin", "borrowing"];

    pub const TECHNICAL: &[(&str, &str)] = &[
        ("rsi", "RSI"),
        ("macd", "MACD"),
        ("moving average", "Moving Average"),
        ("sma", "Moving Average"),
        ("ema", "EMA"),
        ("bollinger", "Bollinger Bands"),
        ("support", "Support"),
        ("resistance", "Resistance"),
        ("momentum", "Momentum"),
        ("overbought", "Overbought/Oversold"),
        ("oversold", "Overbought/Oversold"),
        ("trend", "Trend"),
        ("volume", "Volume"),
        ("chart", "Chart"),
    ];

    pub const FUNDAMENTAL: &[(&str, &str)] = &[
        ("p/e", "P/E Ratio"),
        ("pe ratio", "P/E Ratio"),
        ("valuation", "Valuation"),
        ("earnings", "Earnings"),
        ("eps", "EPS"),
        ("revenue", "Revenue"),
        ("profit", "Profitability"),
        ("margin", "Profit Margin"),
        ("dividend", "Dividend"),
        ("debt", "Debt"),
        ("market cap", "Market Cap"),
        ("book value", "Book Value"),
        ("cash flow", "Cash Flow"),
    ];

    pub const MARKETS: &[(&str, &str)] = &[
        ("tadawul", "Tadawul"),
        ("tasi", "TASI"),
        ("nomu", "Nomu"),
        ("saudi market", "Tadawul"),
        ("saudi exchange", "Tadawul"),
        ("saudi stock market", "Tadawul"),
    ];

    pub const TIMEFRAMES: &[(&str, &str)] = &[
        ("today", "today"),
        ("this week", "week"),
        ("this month", "month"),
        ("quarter", "quarter"),
        ("this year", "year"),
        ("short term", "short-term"),
        ("short-term", "short-term"),
        ("long term", "long-term"),
        ("long-term", "long-term"),
    ];

    pub const METRICS: &[&str] = &["price", "volume", "return", "yield", "change", "market cap"];

    pub const REGULATORY: &[&str] = &[
        "regulation",
        "regulations",
        "regulatory",
        "cma",
        "capital market authority",
        "compliance",
        "ipo",
        "listing",
        "zakat",
        "disclosure",
    ];

    /// Words that only make sense when a company is already under discussion
    pub const COMPANY_REFERENCES: &[&str] = &[
        "company", "stock", "share", "shares", "it", "its", "they", "their", "price", "earnings",
        "dividend", "results", "management",
    ];
}

pub(crate) mod keywords_ar {
    pub const BULLISH: &[&str] = &["صعود", "ارتفاع", "شراء", "نمو", "إيجابي", "مكاسب"];

    pub const BEARISH: &[&str] = &["هبوط", "انخفاض", "بيع", "خسارة", "سلبي", "تراجع"];

    pub const HIGH_RISK: &[&str] = &["مخاطرة عالية", "تقلب", "تذبذب", "مضاربة"];

    pub const LOW_RISK: &[&str] = &["مستقر", "آمن", "دفاعي"];

    pub const HEDGING: &[&str] = &["تحوط", "تنويع"];

    pub const LEVERAGE: &[&str] = &["رافعة", "هامش"];

    pub const TECHNICAL: &[(&str, &str)] = &[
        ("مؤشر القوة النسبية", "RSI"),
        ("المتوسط المتحرك", "Moving Average"),
        ("دعم", "Support"),
        ("مقاومة", "Resistance"),
        ("زخم", "Momentum"),
        ("تحليل فني", "Chart"),
    ];

    pub const FUNDAMENTAL: &[(&str, &str)] = &[
        ("مكرر الربحية", "P/E Ratio"),
        ("أرباح", "Earnings"),
        ("إيرادات", "Revenue"),
        ("توزيعات", "Dividend"),
        ("ديون", "Debt"),
        ("القيمة السوقية", "Market Cap"),
    ];

    pub const MARKETS: &[(&str, &str)] = &[
        ("تداول", "Tadawul"),
        ("تاسي", "TASI"),
        ("السوق السعودي", "Tadawul"),
        ("السوق السعودية", "Tadawul"),
    ];

    pub const TIMEFRAMES: &[(&str, &str)] = &[
        ("اليوم", "today"),
        ("هذا الأسبوع", "week"),
        ("قصير المدى", "short-term"),
        ("طويل المدى", "long-term"),
    ];

    pub const METRICS: &[&str] = &["سعر", "حجم", "عائد"];

    pub const REGULATORY: &[&str] = &["هيئة السوق المالية", "لائحة", "تنظيم", "زكاة", "إدراج", "اكتتاب"];

    pub const COMPANY_REFERENCES: &[&str] = &["الشركة", "سهم", "أسهم", "السهم"];
}

/// Name tokens too common to identify a company on their own
pub(crate) const GENERIC_NAME_TOKENS: &[&str] = &[
    "saudi", "arabian", "company", "group", "national", "bank", "power", "holding", "services",
];
