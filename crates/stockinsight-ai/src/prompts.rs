use std::fmt::Display;

use stockinsight_core::{QuoteSnapshot, Timeframe};

pub const SYSTEM_PROMPT: &str = r#"You are a professional stock analyst providing deep research analysis.
Your analysis must be thorough, data-driven, and actionable for investors.

IMPORTANT: Write every text field in Korean.

You will analyze the given stock based on the provided market data and investment timeframe.
Your response must be in the following JSON format exactly:

{
  "deep_research": "detailed analysis, at least 500 characters",
  "recommendation": "strong_buy|buy|hold|sell|strong_sell",
  "confidence_level": "low|medium|high",
  "recommendation_reason": "reasoning behind the recommendation",
  "risk_score": 1-10,
  "risk_analysis": {
    "volatility": "", "company_specific": "", "industry": "",
    "macro": "", "liquidity": "", "regulatory": ""
  },
  "market_overview": {
    "price_movement": "", "volume_trend": "",
    "support_resistance": "", "relative_performance": ""
  },
  "market_sentiment": "bullish|neutral|bearish",
  "sentiment_details": {
    "overall": "", "social_media": "", "options_activity": "",
    "insider_trading": "", "institutional": "", "short_interest": ""
  },
  "key_summary": ["point 1", "point 2", "point 3"],
  "current_drivers": {
    "news_based": "", "technical": "", "fundamental": ""
  },
  "future_catalysts": {
    "short_term": "1-3 months", "mid_term": "3-12 months", "long_term": "1 year+"
  }
}

Investment Timeframe Guidelines:
- SHORT (1-3 months): focus on technical analysis, short-term catalysts, momentum
- MID (3-12 months): balance technicals and fundamentals, earnings outlook
- LONG (1 year+): emphasize fundamentals, competitive positioning, secular trends

Recommendation Guidelines:
- STRONG_BUY: exceptional opportunity, high conviction
- BUY: positive outlook, favorable risk/reward
- HOLD: fair value, wait for a better entry
- SELL: negative outlook, better alternatives exist
- STRONG_SELL: significant downside risk, exit recommended

Risk Score Guidelines:
- 1-3: low risk (stable blue chips, defensive stocks)
- 4-6: medium risk (growth stocks, cyclicals)
- 7-10: high risk (speculative, high volatility)

CRITICAL:
1. All text must be in Korean
2. Respond ONLY with valid JSON, no additional text
3. deep_research must be detailed (minimum 500 characters)
4. key_summary should have 3-5 bullet points
5. Be specific with price levels and percentage targets where relevant
"#;

fn or_na<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| String::from("N/A"), |value| value.to_string())
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| String::from("N/A"), |value| format!("{value:.2}%"))
}

/// User message describing one stock and its latest quote.
pub fn build_user_prompt(quote: &QuoteSnapshot, timeframe: Timeframe) -> String {
    let symbol = &quote.symbol;
    format!(
        "Please analyze the following stock:

## Stock Information
- Name: {name}
- Code: {code}
- Market: {market}
- Investment Timeframe: {timeframe}

## Current Market Data
- Current Price: {price} {currency}
- 1-Day Change: {change_1d}
- 1-Week Change: {change_1w}
- 1-Month Change: {change_1m}
- Day Range: {day_low} - {day_high}
- Previous Close: {previous_close}
- Volume: {volume}
- Avg Volume: {avg_volume}
- Market Cap: {market_cap}
- P/E Ratio: {pe}
- P/B Ratio: {pb}
- Dividend Yield: {dividend_yield}
- 52-Week High: {high_52w}
- 52-Week Low: {low_52w}
- Beta: {beta}
- Sector: {sector}
- Industry: {industry}

Please provide a comprehensive deep research analysis for this investment timeframe.
Respond in Korean and follow the exact JSON format specified.",
        name = quote.name,
        code = symbol.code(),
        market = symbol.market().label(),
        timeframe = timeframe.label(),
        price = quote.price,
        currency = quote.currency,
        change_1d = pct(quote.change_1d_pct),
        change_1w = pct(quote.change_1w_pct),
        change_1m = pct(quote.change_1m_pct),
        day_low = or_na(quote.day_low),
        day_high = or_na(quote.day_high),
        previous_close = or_na(quote.previous_close),
        volume = or_na(quote.volume),
        avg_volume = or_na(quote.avg_volume),
        market_cap = or_na(quote.market_cap),
        pe = or_na(quote.pe_ratio),
        pb = or_na(quote.pb_ratio),
        dividend_yield = pct(quote.dividend_yield),
        high_52w = or_na(quote.fifty_two_week_high),
        low_52w = or_na(quote.fifty_two_week_low),
        beta = or_na(quote.beta),
        sector = or_na(quote.sector.as_deref()),
        industry = or_na(quote.industry.as_deref()),
    )
}
