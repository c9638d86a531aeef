//! 句柄分配器
//!
//! 所有对客户程序可见的对象 (文件、目录、回调) 都通过 [`ResourceList`] 分配。
//! 编号从 1 开始单调递增；释放的对象仍由列表持有，下次分配时按后进先出顺序
//! 连同原编号一起复用。

use hashlink::LinkedHashSet;
use nohash_hasher::BuildNoHashHasher;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("找不到 {kind} (id = {id})")]
    NotFound { kind: &'static str, id: i32 },
    #[error("{kind} 已经被释放 (id = {id})")]
    AlreadyFree { kind: &'static str, id: i32 },
}

/// 可由 [`ResourceList`] 管理的对象
pub trait ResourceItem {
    fn id(&self) -> i32;
}

pub struct ResourceList<T> {
    kind: &'static str,
    // 下标 = id - 1
    slots: Vec<T>,
    // 存活对象，按分配顺序
    live: LinkedHashSet<i32, BuildNoHashHasher<i32>>,
    retired: Vec<i32>,
    create: Box<dyn Fn(i32) -> T>,
}

impl<T: ResourceItem> ResourceList<T> {
    pub fn new(kind: &'static str, create: impl Fn(i32) -> T + 'static) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            live: LinkedHashSet::with_hasher(BuildNoHashHasher::default()),
            retired: Vec::new(),
            create: Box::new(create),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// 分配一个对象；复用的对象保留上次的内容，由调用方重新初始化
    pub fn alloc(&mut self) -> &mut T {
        let id = match self.retired.pop() {
            Some(id) => id,
            None => {
                let id = self.slots.len() as i32 + 1;
                let item = (self.create)(id);
                debug_assert_eq!(item.id(), id);
                self.slots.push(item);
                id
            }
        };
        self.live.insert(id);
        &mut self.slots[(id - 1) as usize]
    }

    pub fn free(&mut self, id: i32) -> Result<(), ResourceError> {
        if self.live.remove(&id) {
            self.retired.push(id);
            return Ok(());
        }
        if self.slot_index(id).is_some() {
            Err(ResourceError::AlreadyFree {
                kind: self.kind,
                id,
            })
        } else {
            Err(self.not_found(id))
        }
    }

    pub fn free_item(&mut self, item: &T) -> Result<(), ResourceError> {
        self.free(item.id())
    }

    /// 先查找再释放；已释放的编号视为不存在
    pub fn free_by_id(&mut self, id: i32) -> Result<(), ResourceError> {
        self.get(id)?;
        self.free(id)
    }

    pub fn try_get_by_id(&self, id: i32) -> Option<&T> {
        if self.live.contains(&id) {
            self.slot_index(id).map(|index| &self.slots[index])
        } else {
            None
        }
    }

    pub fn get(&self, id: i32) -> Result<&T, ResourceError> {
        self.try_get_by_id(id).ok_or_else(|| self.not_found(id))
    }

    pub fn get_mut(&mut self, id: i32) -> Result<&mut T, ResourceError> {
        match self.slot_index(id) {
            Some(index) if self.live.contains(&id) => Ok(&mut self.slots[index]),
            _ => Err(self.not_found(id)),
        }
    }

    pub fn contains(&self, id: i32) -> bool {
        self.live.contains(&id)
    }

    /// 按分配顺序遍历存活对象
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.live.iter().map(|&id| &self.slots[(id - 1) as usize])
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    fn slot_index(&self, id: i32) -> Option<usize> {
        (id >= 1 && (id as usize) <= self.slots.len()).then(|| (id - 1) as usize)
    }

    fn not_found(&self, id: i32) -> ResourceError {
        ResourceError::NotFound {
            kind: self.kind,
            id,
        }
    }
}

impl<T> std::fmt::Debug for ResourceList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceList")
            .field("kind", &self.kind)
            .field("allocated", &self.slots.len())
            .field("live", &self.live.len())
            .field("retired", &self.retired)
            .finish()
    }
}
