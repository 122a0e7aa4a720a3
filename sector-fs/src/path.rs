use crate::{Error, Result};

/// 以 `/` 分隔的路径，总是相对于根目录解释
pub trait Path {
    /// 返回路径的最后一项；没有 `/` 时即整个路径
    fn file_name(&self) -> &Self;

    /// 去掉开头的 `/` 后按 `/` 切分，拒绝空的中间项
    fn components(&self) -> Result<Vec<&Self>>;
}

impl Path for str {
    fn file_name(&self) -> &Self {
        self.rsplit_once('/').map_or(self, |(_, name)| name)
    }

    fn components(&self) -> Result<Vec<&Self>> {
        let relative = self.trim_start_matches('/');
        if relative.is_empty() {
            return Err(Error::InvalidPath);
        }

        let cmps: Vec<&str> = relative.split('/').collect();
        if cmps.iter().any(|cmp| cmp.is_empty()) {
            return Err(Error::InvalidPath);
        }
        Ok(cmps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name() {
        assert_eq!("a/b/file".file_name(), "file");
        assert_eq!("file".file_name(), "file");
        assert_eq!("/file".file_name(), "file");
    }

    #[test]
    fn components() {
        assert_eq!("a/b/c".components().unwrap(), ["a", "b", "c"]);
        assert_eq!("/a".components().unwrap(), ["a"]);
        assert_eq!("".components(), Err(Error::InvalidPath));
        assert_eq!("/".components(), Err(Error::InvalidPath));
        assert_eq!("a//b".components(), Err(Error::InvalidPath));
        assert_eq!("a/".components(), Err(Error::InvalidPath));
    }
}
