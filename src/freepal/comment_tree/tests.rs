//! Test suite for reply-forest construction and the thread view policy.

mod tree_tests {
    use super::super::*;
    use crate::freepal::test_utils::sample_comment;
    use std::collections::HashMap;

    fn ids(nodes: &[CommentNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id()).collect()
    }

    /// Parent id of every node in the forest, by child id.
    fn parent_links(roots: &[CommentNode]) -> HashMap<String, Option<String>> {
        let mut links = HashMap::new();
        let mut stack: Vec<(&CommentNode, Option<&str>)> = roots.iter().map(|r| (r, None)).collect();
        while let Some((node, parent)) = stack.pop() {
            let previous = links.insert(node.id().to_string(), parent.map(str::to_string));
            assert!(previous.is_none(), "{} appears twice", node.id());
            stack.extend(node.children.iter().map(|c| (c, Some(node.id()))));
        }
        links
    }

    #[test]
    fn test_empty_input_gives_empty_forest() {
        assert!(build_comment_tree(&[]).is_empty());
    }

    #[test]
    fn test_orphan_is_promoted_to_root() {
        let comments = vec![sample_comment("a", None), sample_comment("b", Some("missing"))];

        let roots = build_comment_tree(&comments);

        assert_eq!(ids(&roots), vec!["a", "b"]);
        assert!(roots.iter().all(|r| r.children.is_empty()));
    }

    #[test]
    fn test_nested_chain() {
        let comments = vec![
            sample_comment("c", Some("b")),
            sample_comment("b", Some("a")),
            sample_comment("a", None),
        ];

        let roots = build_comment_tree(&comments);

        assert_eq!(ids(&roots), vec!["a"]);
        assert_eq!(ids(&roots[0].children), vec!["b"]);
        assert_eq!(ids(&roots[0].children[0].children), vec!["c"]);
        assert_eq!(roots[0].descendant_count(), 2);
    }

    #[test]
    fn test_siblings_keep_fetch_order() {
        // Newest first, as fetched
        let comments = vec![
            sample_comment("r3", Some("root")),
            sample_comment("r2", Some("root")),
            sample_comment("root", None),
            sample_comment("r1", Some("root")),
        ];

        let roots = build_comment_tree(&comments);

        assert_eq!(ids(&roots[0].children), vec!["r3", "r2", "r1"]);
    }

    #[test]
    fn test_every_comment_appears_once_with_its_parent() {
        // Deterministic pseudo-random parent links, some dangling
        let mut seed: u64 = 0x5eed;
        let mut comments = Vec::new();
        for i in 0..200 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let parent = match (seed >> 33) % 4 {
                0 => None,
                1 => Some(format!("missing-{}", i)),
                _ => Some(format!("c{}", (seed >> 40) % 200)),
            };
            comments.push(sample_comment(&format!("c{}", i), parent.as_deref()));
        }

        let roots = build_comment_tree(&comments);
        let links = parent_links(&roots);

        assert_eq!(links.len(), comments.len());
        assert_eq!(count_comments(&roots), comments.len());
        let known: std::collections::HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();
        for comment in &comments {
            let placed_under = links[&comment.id].as_deref();
            match comment.parent_comment_id.as_deref() {
                Some(parent) if known.contains(parent) && parent != comment.id => {
                    // Attached under its parent unless that link closed a cycle
                    assert!(placed_under == Some(parent) || placed_under.is_none());
                }
                _ => assert_eq!(placed_under, None, "{} should be a root", comment.id),
            }
        }
    }

    #[test]
    fn test_rebuild_is_identical() {
        let comments = vec![
            sample_comment("a", None),
            sample_comment("b", Some("a")),
            sample_comment("c", Some("a")),
            sample_comment("d", Some("gone")),
            sample_comment("e", Some("c")),
        ];

        assert_eq!(build_comment_tree(&comments), build_comment_tree(&comments));
    }

    #[test]
    fn test_cycle_is_broken_at_earliest_comment() {
        let comments = vec![
            sample_comment("x", Some("z")),
            sample_comment("y", Some("x")),
            sample_comment("z", Some("y")),
            sample_comment("self", Some("self")),
        ];

        let roots = build_comment_tree(&comments);

        assert_eq!(ids(&roots), vec!["x", "self"]);
        assert_eq!(ids(&roots[0].children), vec!["y"]);
        assert_eq!(ids(&roots[0].children[0].children), vec!["z"]);
    }

    #[test]
    fn test_duplicate_ids_are_all_kept() {
        let comments = vec![
            sample_comment("a", None),
            sample_comment("a", None),
            sample_comment("b", Some("a")),
        ];

        let roots = build_comment_tree(&comments);

        assert_eq!(count_comments(&roots), 3);
        assert_eq!(ids(&roots[0].children), vec!["b"]);
    }

    #[test]
    fn test_deep_chain_builds() {
        let mut comments = vec![sample_comment("c0", None)];
        for i in 1..1000 {
            comments.push(sample_comment(&format!("c{}", i), Some(&format!("c{}", i - 1))));
        }

        let roots = build_comment_tree(&comments);

        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].descendant_count(), 999);
        assert!(find_comment(&roots, "c999").is_some());
    }

    #[test]
    fn test_find_comment_returns_subtree() {
        let comments = vec![
            sample_comment("a", None),
            sample_comment("b", Some("a")),
            sample_comment("c", Some("b")),
        ];
        let roots = build_comment_tree(&comments);

        let focus = find_comment(&roots, "b").unwrap();
        assert_eq!(ids(&focus.children), vec!["c"]);
        assert!(find_comment(&roots, "zzz").is_none());
    }
}

mod view_tests {
    use super::super::*;
    use crate::freepal::test_utils::sample_comment;

    fn view(comments: &[crate::freepal::comments::Comment], state: &ExpansionState) -> ThreadView {
        ThreadView::new(
            &build_comment_tree(comments),
            state,
            &ThreadViewConfig::default(),
        )
    }

    #[test]
    fn test_nested_reply_is_deferred_at_depth_two() {
        let comments = vec![
            sample_comment("A", None),
            sample_comment("B", Some("A")),
            sample_comment("C", Some("B")),
        ];
        let mut state = ExpansionState::new();

        let collapsed = view(&comments, &state);

        assert_eq!(collapsed.visible_ids(), vec!["A", "B"]);
        let b = collapsed.find("B").unwrap();
        assert_eq!(b.level, 1);
        assert_eq!(b.reply_prefix().as_deref(), Some("Reply to @author-A"));
        let control = b.control.clone().unwrap();
        assert_eq!(
            control,
            ThreadControl::ViewFullConversation {
                comment_id: "B".to_string(),
                hidden: 1
            }
        );
        assert_eq!(control.label(), "View full conversation (1 more reply)");

        control.activate(&mut state);
        let expanded = view(&comments, &state);

        assert_eq!(expanded.visible_ids(), vec!["A", "B", "C"]);
        let c = expanded.find("C").unwrap();
        assert_eq!(c.level, 2);
        assert_eq!(c.reply_prefix().as_deref(), Some("Reply to @author-B"));
        assert_eq!(
            expanded.find("B").unwrap().control.as_ref().map(ThreadControl::label).as_deref(),
            Some("Show less")
        );
    }

    #[test]
    fn test_four_roots_paginate_at_three() {
        let comments: Vec<_> = ["r1", "r2", "r3", "r4"]
            .into_iter()
            .map(|id| sample_comment(id, None))
            .collect();
        let mut state = ExpansionState::new();

        let first = view(&comments, &state);
        assert_eq!(first.comments.len(), 3);
        let control = first.control.clone().unwrap();
        assert_eq!(control.label(), "View 1 more comments");

        control.activate(&mut state);
        let all = view(&comments, &state);
        assert_eq!(all.comments.len(), 4);
        let control = all.control.clone().unwrap();
        assert_eq!(control.label(), "Show less");

        control.activate(&mut state);
        assert_eq!(view(&comments, &state).comments.len(), 3);
    }

    #[test]
    fn test_three_roots_have_no_pagination_control() {
        let comments: Vec<_> = ["r1", "r2", "r3"]
            .into_iter()
            .map(|id| sample_comment(id, None))
            .collect();

        let thread = view(&comments, &ExpansionState::new());

        assert_eq!(thread.comments.len(), 3);
        assert_eq!(thread.control, None);
    }

    #[test]
    fn test_root_with_many_replies_shows_first_two() {
        let comments = vec![
            sample_comment("root", None),
            sample_comment("a", Some("root")),
            sample_comment("b", Some("root")),
            sample_comment("c", Some("root")),
            sample_comment("d", Some("root")),
        ];
        let mut state = ExpansionState::new();

        let collapsed = view(&comments, &state);
        let root = collapsed.find("root").unwrap();
        assert_eq!(root.replies.len(), 2);
        let control = root.control.clone().unwrap();
        assert_eq!(control.label(), "Show 2 more replies");

        control.activate(&mut state);
        let expanded = view(&comments, &state);
        assert_eq!(expanded.visible_ids(), vec!["root", "a", "b", "c", "d"]);

        state.toggle_replies("root");
        assert_eq!(view(&comments, &state).find("root").unwrap().replies.len(), 2);
    }

    #[test]
    fn test_root_with_two_replies_shows_both() {
        let comments = vec![
            sample_comment("root", None),
            sample_comment("a", Some("root")),
            sample_comment("b", Some("root")),
        ];

        let thread = view(&comments, &ExpansionState::new());
        let root = thread.find("root").unwrap();

        assert_eq!(root.replies.len(), 2);
        assert_eq!(root.control, None);
        assert_eq!(root.reply_prefix(), None);
    }

    #[test]
    fn test_single_hidden_reply_label_is_singular() {
        let comments = vec![
            sample_comment("root", None),
            sample_comment("a", Some("root")),
            sample_comment("b", Some("root")),
            sample_comment("c", Some("root")),
        ];

        let thread = view(&comments, &ExpansionState::new());

        assert_eq!(
            thread.find("root").unwrap().control.as_ref().unwrap().label(),
            "Show 1 more reply"
        );
    }

    #[test]
    fn test_deeper_visual_level() {
        let comments = vec![
            sample_comment("A", None),
            sample_comment("B", Some("A")),
            sample_comment("C", Some("B")),
            sample_comment("D", Some("C")),
        ];
        let config = ThreadViewConfig {
            max_visual_level: 2,
            ..ThreadViewConfig::default()
        };

        let thread = ThreadView::new(&build_comment_tree(&comments), &ExpansionState::new(), &config);

        assert_eq!(thread.visible_ids(), vec!["A", "B", "C"]);
        assert!(matches!(
            thread.find("C").unwrap().control,
            Some(ThreadControl::ViewFullConversation { hidden: 1, .. })
        ));
    }

    #[test]
    fn test_heading_counts_every_comment() {
        let one = view(&[sample_comment("a", None)], &ExpansionState::new());
        assert_eq!(one.heading(), "1 Comment");

        let comments = vec![
            sample_comment("a", None),
            sample_comment("b", Some("a")),
            sample_comment("c", Some("b")),
        ];
        assert_eq!(view(&comments, &ExpansionState::new()).heading(), "3 Comments");
    }

    #[test]
    fn test_hidden_roots_are_not_rendered() {
        let comments: Vec<_> = ["r1", "r2", "r3", "r4", "r5"]
            .into_iter()
            .map(|id| sample_comment(id, None))
            .collect();

        let thread = view(&comments, &ExpansionState::new());

        assert_eq!(thread.visible_ids(), vec!["r1", "r2", "r3"]);
        assert_eq!(thread.total_comments, 5);
        assert_eq!(
            thread.control,
            Some(ThreadControl::ViewMoreComments { hidden: 2 })
        );
    }
}
