//! Static Korean display names, used when neither catalogue has one.

const KOREAN_NAMES: &[(&str, &str)] = &[
    ("BTC", "비트코인"),
    ("ETH", "이더리움"),
    ("XRP", "리플"),
    ("ADA", "에이다"),
    ("DOT", "폴카닷"),
    ("LINK", "체인링크"),
    ("LTC", "라이트코인"),
    ("BCH", "비트코인캐시"),
    ("XLM", "스텔라루멘"),
    ("EOS", "이오스"),
    ("DOGE", "도지코인"),
    ("SOL", "솔라나"),
    ("MATIC", "폴리곤"),
    ("AVAX", "아발란체"),
    ("ATOM", "코스모스"),
    ("NEAR", "니어프로토콜"),
    ("WLD", "월드코인"),
    ("BONK", "봉크"),
    ("PEPE", "페페"),
    ("SHIB", "시바이누"),
    ("FLOKI", "플로키이누"),
    ("RENDER", "렌더"),
    ("FET", "페치에이아이"),
    ("SAND", "샌드박스"),
    ("MANA", "디센트럴랜드"),
    ("ENJ", "엔진코인"),
    ("CHZ", "칠리즈"),
    ("FLOW", "플로우"),
    ("IMX", "이뮤터블엑스"),
    ("GALA", "갈라"),
    ("AXS", "액시인피니티"),
    ("UNI", "유니스왚"),
    ("SUSHI", "스시스왚"),
    ("AAVE", "에이브"),
    ("COMP", "컴파운드"),
    ("MKR", "메이커"),
    ("SNX", "신세틱스"),
    ("CRV", "커브"),
    ("YFI", "연파이낸스"),
    ("1INCH", "원인치"),
    ("ALGO", "알고랜드"),
    ("VET", "비체인"),
    ("ICP", "인터넷컴퓨터"),
    ("FTM", "팬텀"),
    ("THETA", "세타"),
    ("HBAR", "헤데라"),
    ("TRX", "트론"),
    ("FIL", "파일코인"),
    ("KLAY", "클레이튼"),
    ("WEMIX", "위믹스"),
    ("QTUM", "퀀텀"),
    ("ICX", "아이콘"),
    ("WAVES", "웨이브"),
    ("ZIL", "질리카"),
    ("ONE", "하모니"),
    ("CELO", "셀로"),
    ("KAVA", "카바"),
    ("CTC", "크레딧코인"),
    ("META", "메타디움"),
    ("MBL", "무비블록"),
    ("USDT", "테더"),
    ("USDC", "유에스디코인"),
    ("ARB", "아비트럼"),
    ("OP", "옵티미즘"),
    ("LDO", "리도"),
    ("GRT", "더그래프"),
    ("BAT", "베이직어텐션토큰"),
    ("ZRX", "제로엑스"),
    ("XMR", "모네로"),
    ("ZEC", "지캐시"),
    ("NEO", "네오"),
    ("ENA", "에테나"),
    ("SUI", "수이"),
    ("APT", "앱토스"),
    ("INJ", "인젝티브"),
    ("SEI", "세이"),
    ("STX", "스택스"),
    ("JUP", "주피터"),
    ("ONDO", "온도파이낸스"),
    ("KAIA", "카이아"),
    ("BSV", "비트코인에스브이"),
    ("XTZ", "테조스"),
    ("CRO", "크로노스"),
];

/// Korean name for `symbol`, if the static table has one.
pub fn korean_name(symbol: &str) -> Option<&'static str> {
    let upper = symbol.to_ascii_uppercase();
    KOREAN_NAMES
        .iter()
        .find(|(s, _)| *s == upper)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_symbols() {
        assert_eq!(korean_name("BTC"), Some("비트코인"));
        assert_eq!(korean_name("sol"), Some("솔라나"));
        assert_eq!(korean_name("NOTACOIN"), None);
    }

    #[test]
    fn test_no_duplicate_symbols() {
        let mut symbols: Vec<&str> = KOREAN_NAMES.iter().map(|(s, _)| *s).collect();
        symbols.sort_unstable();
        let before = symbols.len();
        symbols.dedup();
        assert_eq!(before, symbols.len());
    }
}
