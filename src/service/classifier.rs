use indexmap::IndexMap;
use once_cell::sync::Lazy;

/// 兜底科目
pub const OTHER_CATEGORY: &str = "其他";

/// 费用科目关键词规则
///
/// IndexMap 保持声明顺序: 科目之间的关键词并不互斥 (销方名称可能同时命中
/// 交通和餐饮), 首个命中的科目生效, 因此迭代顺序是契约的一部分。
static CATEGORY_RULES: Lazy<IndexMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    IndexMap::from([
        (
            "交通费",
            vec!["滴滴", "出租", "地铁", "公交", "高铁", "火车", "机票", "航空", "铁路", "出行"],
        ),
        ("差旅费-住宿", vec!["酒店", "宾馆", "民宿", "住宿", "旅馆", "客房"]),
        (
            "业务招待费",
            vec!["餐饮", "餐厅", "饭店", "酒楼", "餐馆", "食堂", "全聚德", "海底捞"],
        ),
        (
            "办公费",
            vec!["文具", "打印", "复印", "办公用品", "纸张", "墨盒", "笔记本", "文件夹"],
        ),
        ("通讯费", vec!["电信", "移动", "联通", "话费", "通讯", "宽带"]),
        (
            "固定资产",
            vec!["固定资产", "设备", "电脑", "服务器", "打印机", "空调", "家具"],
        ),
        ("低值易耗品", vec!["低值易耗", "工具", "耗材"]),
    ])
});

/// 科目编码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAccount {
    pub code: &'static str,
    pub name: &'static str,
}

static ACCOUNT_CODE_MAP: Lazy<IndexMap<&'static str, LedgerAccount>> = Lazy::new(|| {
    IndexMap::from([
        ("交通费", LedgerAccount { code: "660206", name: "管理费用-交通费" }),
        ("差旅费-住宿", LedgerAccount { code: "660207", name: "管理费用-差旅费" }),
        ("业务招待费", LedgerAccount { code: "660208", name: "管理费用-业务招待费" }),
        ("办公费", LedgerAccount { code: "660201", name: "管理费用-办公费" }),
        ("通讯费", LedgerAccount { code: "660203", name: "管理费用-通讯费" }),
        ("固定资产", LedgerAccount { code: "1601", name: "固定资产" }),
        ("低值易耗品", LedgerAccount { code: "140301", name: "周转材料-低值易耗品" }),
        ("其他", LedgerAccount { code: "660299", name: "管理费用-其他" }),
    ])
});

/// 根据销方名称和商品明细自动分类费用科目, 无命中返回 "其他"
pub fn classify_expense(seller_name: &str, items: &[String]) -> &'static str {
    let mut text = String::from(seller_name);
    for item in items {
        text.push(' ');
        text.push_str(item);
    }
    let text = text.to_lowercase();

    for (&category, keywords) in CATEGORY_RULES.iter() {
        for keyword in keywords {
            if text.contains(&keyword.to_lowercase()) {
                return category;
            }
        }
    }

    OTHER_CATEGORY
}

/// 查科目编码, 未配置的科目 (含兜底科目) 落到 "其他" 条目
pub fn resolve_account(category: &str) -> &'static LedgerAccount {
    ACCOUNT_CODE_MAP
        .get(category)
        .unwrap_or_else(|| &ACCOUNT_CODE_MAP[OTHER_CATEGORY])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn classifies_by_seller_name() {
        assert_eq!(classify_expense("滴滴出行科技有限公司", &[]), "交通费");
        assert_eq!(classify_expense("如家酒店管理有限公司", &[]), "差旅费-住宿");
        assert_eq!(classify_expense("中国电信股份有限公司", &[]), "通讯费");
    }

    #[test]
    fn classifies_by_item_text() {
        assert_eq!(classify_expense("", &items(&["高铁票 北京-上海"])), "交通费");
        assert_eq!(classify_expense("", &items(&["A4 纸张", "墨盒"])), "办公费");
    }

    #[test]
    fn first_declared_category_wins() {
        // 同时命中交通费(出行)与业务招待费(餐饮): 交通费先声明, 必须胜出
        assert_eq!(classify_expense("出行餐饮服务中心", &[]), "交通费");
        // 反向文本顺序也不影响结果
        assert_eq!(classify_expense("餐饮出行服务中心", &[]), "交通费");
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let seller = "海底捞火锅店";
        let first = classify_expense(seller, &[]);
        for _ in 0..10 {
            assert_eq!(classify_expense(seller, &[]), first);
        }
        assert_eq!(first, "业务招待费");
    }

    #[test]
    fn unmatched_text_falls_back_to_other() {
        assert_eq!(classify_expense("某某咨询有限公司", &items(&["服务费"])), "其他");
        assert_eq!(classify_expense("", &[]), "其他");
    }

    #[test]
    fn resolves_known_accounts() {
        assert_eq!(resolve_account("交通费").code, "660206");
        assert_eq!(resolve_account("固定资产").code, "1601");
        assert_eq!(resolve_account("低值易耗品").code, "140301");
    }

    #[test]
    fn unknown_category_resolves_to_other_account() {
        assert_eq!(resolve_account("其他").code, "660299");
        assert_eq!(resolve_account("不存在的科目").code, "660299");
        assert_eq!(resolve_account("不存在的科目").name, "管理费用-其他");
    }
}
