//! `${name}` 플레이스홀더 템플릿
//!
//! Expression 로케이터, 캐시 키, 동적 필드 이름이 같은 문법을 사용합니다.

/// 부모 활동 참조 접두어 (`^.Name`은 부모 레코드의 `Name` 필드)
pub const PARENT_REF_PREFIX: &str = "^.";

/// 템플릿에 포함된 플레이스홀더 이름을 순서대로 반환합니다.
pub fn vars(template: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if !name.is_empty() {
                    out.push(name.to_owned());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}

/// 플레이스홀더를 치환합니다.
///
/// 값을 찾지 못한 플레이스홀더는 그대로 남고, 반환값의 두 번째 요소가 `false`가 됩니다.
pub fn fill(template: &str, mut lookup: impl FnMut(&str) -> Option<String>) -> (String, bool) {
    let mut out = String::with_capacity(template.len());
    let mut resolved = true;
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup(name) {
                    Some(val) => out.push_str(&val),
                    None => {
                        resolved = false;
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    (out, resolved)
}

/// 템플릿이 정확히 하나의 플레이스홀더로만 이루어졌으면 그 이름을 반환합니다.
pub fn sole_var(template: &str) -> Option<&str> {
    let inner = template.strip_prefix("${")?.strip_suffix('}')?;
    (!inner.is_empty() && !inner.contains('}')).then_some(inner)
}

/// 부모 활동 참조인지 확인합니다.
pub fn is_parent_ref(name: &str) -> bool {
    name.starts_with(PARENT_REF_PREFIX)
}

/// `$DATA$`처럼 `$`로 감싼 컨텍스트 플레이스홀더인지 확인합니다.
pub fn is_context_placeholder(name: &str) -> bool {
    name.len() > 1 && name.starts_with('$') && name.ends_with('$')
}
