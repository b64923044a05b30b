/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// 复习历史默认返回条数
pub const DEFAULT_REVIEW_HISTORY_LIMIT: usize = 50;

/// 复习历史最大返回条数
pub const MAX_REVIEW_HISTORY_LIMIT: usize = 500;

/// 单次推荐请求最多接受的候选条目数
pub const MAX_RECOMMENDATION_ITEMS: usize = 1_000;

/// 显示名称最大长度
pub const MAX_DISPLAY_NAME_LEN: usize = 100;

/// 题目标签数量上限
pub const MAX_PROBLEM_TAGS: usize = 32;
